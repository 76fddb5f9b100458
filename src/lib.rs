#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! # Chat Relay
//!
//! A minimal line-oriented chat relay over TCP.
//!
//! Clients send newline-terminated UTF-8 lines; every line is stamped with the
//! relay's local time and rebroadcast as `(HH:MM:SS) line` to every connected
//! client, the sender included. A client that connects later first receives
//! the history of everything broadcast so far, then live traffic.

/// Ordered fan-out of stamped messages
pub mod broadcast;

/// Server configuration and environment variables
pub mod config;

/// Relay-level error types
pub mod error;

/// Message history replayed to late joiners
pub mod history;

/// Structured logging configuration
pub mod logging;

/// Relayed messages and their wire form
pub mod message;

/// Relay counters
pub mod metrics;

/// Live session bookkeeping
pub mod registry;

/// Listener, accept loop and shutdown
pub mod server;

/// Per-connection read and write loops
pub mod session;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use error::RelayError;
pub use history::MessageLog;
pub use message::{Message, SharedMessage};
pub use registry::{ConnectionId, ConnectionRegistry, DeliveryError, SessionHandle};
pub use server::{RelayConfig, RelayServer, ShutdownHandle};
pub use session::{ClientSession, SessionEnd};
