//! Relayed chat lines and their wire rendering.
//!
//! Every line a client sends is stamped once, at the moment it reaches the
//! broadcaster, and rendered once into the `(HH:MM:SS) text` form that goes out
//! on the wire. The rendered form is shared (`Arc`) by every recipient queue and
//! by the history, so fan-out never re-formats or copies the payload.

use chrono::{Local, NaiveTime};
use std::fmt;
use std::sync::Arc;

/// `strftime` pattern for the relay-assigned timestamp.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// A message shared between the history and every recipient queue.
pub type SharedMessage = Arc<Message>;

/// A single relayed line, immutable once stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    timestamp: String,
    rendered: Arc<str>,
}

impl Message {
    /// Stamp `text` with the current local time.
    pub fn new(text: impl Into<String>) -> Self {
        Self::stamped(text, Local::now().time())
    }

    /// Stamp `text` with an explicit time of day.
    pub fn stamped(text: impl Into<String>, time: NaiveTime) -> Self {
        let text = text.into();
        let timestamp = time.format(TIMESTAMP_FORMAT).to_string();
        let rendered = Arc::from(format!("({timestamp}) {text}"));
        Self {
            text,
            timestamp,
            rendered,
        }
    }

    /// Payload exactly as the client sent it.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Relay-assigned `HH:MM:SS` stamp.
    #[inline]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Wire form without the trailing newline.
    #[inline]
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Text of the system notice broadcast when the `ordinal`-th client connects.
pub fn join_notice(ordinal: u64) -> String {
    format!("Client no {ordinal} connected.")
}
