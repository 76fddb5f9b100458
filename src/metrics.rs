use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Relay-wide counters. Updates are relaxed, so a snapshot is only eventually
/// consistent across fields.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    pub connections_accepted: AtomicU64,
    pub active_sessions: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub accept_errors: AtomicU64,

    // Traffic metrics
    pub messages_broadcast: AtomicU64,
    pub lines_replayed: AtomicU64,
    pub delivery_failures: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RelayMetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub connections_accepted: u64,
    pub active_sessions: u64,
    pub sessions_closed: u64,
    pub accept_errors: u64,
    pub messages_broadcast: u64,
    pub lines_replayed: u64,
    pub delivery_failures: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_connections(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        // Saturating decrement.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_accept_errors(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_messages_broadcast(&self) {
        self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_lines_replayed(&self, count: u64) {
        self.lines_replayed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            timestamp: chrono::Utc::now(),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            messages_broadcast: self.messages_broadcast.load(Ordering::Relaxed),
            lines_replayed: self.lines_replayed.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lifecycle_counters() {
        let metrics = RelayMetrics::new();
        metrics.increment_connections();
        metrics.increment_connections();
        metrics.record_session_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_accepted, 2);
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.sessions_closed, 1);
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let metrics = RelayMetrics::new();
        metrics.record_session_closed();
        assert_eq!(metrics.snapshot().active_sessions, 0);
        assert_eq!(metrics.snapshot().sessions_closed, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = RelayMetrics::new();
        metrics.add_lines_replayed(5);
        metrics.increment_messages_broadcast();
        metrics.increment_delivery_failures();
        metrics.increment_accept_errors();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["lines_replayed"], 5);
        assert_eq!(json["messages_broadcast"], 1);
        assert_eq!(json["delivery_failures"], 1);
        assert_eq!(json["accept_errors"], 1);
    }
}
