//! Default value functions for configuration fields.
//!
//! These back the `#[serde(default = ...)]` attributes throughout the
//! configuration types, so a partial config file only needs the fields it
//! changes.

use super::logging::LogFormat;

// =============================================================================
// Listener
// =============================================================================

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub const fn default_port() -> u16 {
    9999
}

// =============================================================================
// Relay Defaults
// =============================================================================

pub const fn default_outbound_queue_capacity() -> usize {
    1024
}

pub const fn default_shutdown_grace_secs() -> u64 {
    5
}

pub const fn default_max_line_length() -> usize {
    65536 // 64KB
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "relay.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
