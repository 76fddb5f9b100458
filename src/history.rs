//! Append-only message history replayed to late joiners.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::message::{Message, SharedMessage};

/// Ordered log of every message broadcast during this run.
///
/// Insertion order is the order in which the broadcaster stamped messages.
/// With a `limit`, the oldest entries are evicted once the log is full, so the
/// backlog a new client receives is "the last `limit` messages at join time".
#[derive(Debug)]
pub struct MessageLog {
    entries: RwLock<VecDeque<SharedMessage>>,
    limit: Option<usize>,
}

impl MessageLog {
    /// Create a log, optionally capped at `limit` entries.
    pub fn new(limit: Option<usize>) -> Self {
        let initial = limit.map_or(0, |cap| cap.min(1024));
        Self {
            entries: RwLock::new(VecDeque::with_capacity(initial)),
            limit,
        }
    }

    /// Create a log that never evicts.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Stamp `text` with the current time and append it.
    pub async fn append(&self, text: impl Into<String>) -> SharedMessage {
        self.push(Message::new(text)).await
    }

    /// Append an already stamped message.
    pub async fn push(&self, message: Message) -> SharedMessage {
        let message = Arc::new(message);
        let mut entries = self.entries.write().await;
        if let Some(limit) = self.limit {
            while entries.len() >= limit.max(1) {
                entries.pop_front();
            }
        }
        entries.push_back(Arc::clone(&message));
        message
    }

    /// Consistent copy of the log in insertion order.
    pub async fn snapshot(&self) -> Vec<SharedMessage> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::unbounded()
    }
}
