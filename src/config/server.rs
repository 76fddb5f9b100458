//! Relay behavior configuration types.

use super::defaults::{
    default_max_line_length, default_outbound_queue_capacity, default_shutdown_grace_secs,
};
use serde::{Deserialize, Serialize};

/// Relay configuration for sessions and history.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Lines buffered per session before a slow client is dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Cap on replayed history; `null` keeps every message for the process lifetime
    #[serde(default)]
    pub history_limit: Option<usize>,
    /// Seconds to wait for sessions to close on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Longest inbound line in bytes; a longer line ends that client's session
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_queue_capacity(),
            history_limit: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            max_line_length: default_max_line_length(),
        }
    }
}
