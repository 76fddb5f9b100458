//! Fan-out of stamped messages to every registered session.
//!
//! The broadcaster is the single ordering point of the relay:
//! - `broadcast` appends to the history and enqueues the same shared message to
//!   every session in one critical section, so all clients observe the same
//!   relative order.
//! - `admit` registers a new session and snapshots the backlog under that same
//!   critical section, so a concurrent broadcast lands in exactly one of
//!   "replayed backlog" or "live queue" for the newcomer.
//!
//! Enqueueing never waits on a socket; actual writes happen in each session's
//! writer outside the lock.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::history::MessageLog;
use crate::message::{Message, SharedMessage};
use crate::metrics::RelayMetrics;
use crate::registry::{ConnectionId, ConnectionRegistry, SessionHandle};

/// Outcome of a single `broadcast` call.
#[derive(Debug, Clone)]
pub struct BroadcastReport {
    pub message: SharedMessage,
    pub delivered: usize,
    /// Sessions torn down because their queue was full or closed.
    pub failed: Vec<ConnectionId>,
}

impl BroadcastReport {
    pub fn recipient_count(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

#[derive(Debug)]
pub struct Broadcaster {
    history: MessageLog,
    registry: ConnectionRegistry,
    metrics: Arc<RelayMetrics>,
    order: Mutex<()>,
}

impl Broadcaster {
    pub fn new(
        history: MessageLog,
        registry: ConnectionRegistry,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            history,
            registry,
            metrics,
            order: Mutex::new(()),
        }
    }

    /// Register `session` and return the backlog it must be sent before any
    /// live message.
    pub async fn admit(&self, session: SessionHandle) -> Vec<SharedMessage> {
        let _order = self.order.lock().await;
        let backlog = self.history.snapshot().await;
        debug!(
            connection_id = %session.id(),
            peer_addr = %session.peer_addr(),
            backlog = backlog.len(),
            "Session admitted"
        );
        self.registry.add(session);
        backlog
    }

    /// Stamp `text` with the current time, record it and fan it out.
    pub async fn broadcast(&self, text: impl Into<String>) -> BroadcastReport {
        self.broadcast_message(Message::new(text)).await
    }

    /// Record an already stamped message and fan it out.
    pub async fn broadcast_message(&self, message: Message) -> BroadcastReport {
        let _order = self.order.lock().await;
        let message = self.history.push(message).await;
        let recipients = self.registry.snapshot();

        let mut report = BroadcastReport {
            message: Arc::clone(&message),
            delivered: 0,
            failed: Vec::new(),
        };

        for session in recipients {
            match session.deliver(&message) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        connection_id = %session.id(),
                        peer_addr = %session.peer_addr(),
                        error = %err,
                        "Delivery failed, closing session"
                    );
                    self.metrics.increment_delivery_failures();
                    self.disconnect(session.id());
                    session.close();
                    report.failed.push(session.id());
                }
            }
        }

        self.metrics.increment_messages_broadcast();
        debug!(
            line = %message,
            recipients = report.recipient_count(),
            failed = report.failed.len(),
            "Broadcast"
        );
        report
    }

    /// Remove a session from the fan-out set and signal it to stop.
    /// Returns whether the session was still registered.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Close every registered session.
    pub fn disconnect_all(&self) -> usize {
        self.registry.close_all()
    }

    #[inline]
    pub fn history(&self) -> &MessageLog {
        &self.history
    }

    #[inline]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn broadcaster() -> Broadcaster {
        Broadcaster::new(
            MessageLog::unbounded(),
            ConnectionRegistry::new(),
            Arc::new(RelayMetrics::new()),
        )
    }

    fn session(
        ordinal: u64,
        capacity: usize,
    ) -> (SessionHandle, mpsc::Receiver<SharedMessage>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        (
            SessionHandle::new(ConnectionId::new(ordinal), addr, tx, cancel.clone()),
            rx,
            cancel,
        )
    }

    fn drain(rx: &mut mpsc::Receiver<SharedMessage>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(message) = rx.try_recv() {
            texts.push(message.text().to_string());
        }
        texts
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session_including_sender() {
        let broadcaster = broadcaster();
        let (a, mut rx_a, _) = session(1, 8);
        let (b, mut rx_b, _) = session(2, 8);
        broadcaster.admit(a).await;
        broadcaster.admit(b).await;

        let report = broadcaster.broadcast("Alice: hi").await;

        assert_eq!(report.delivered, 2);
        assert!(report.failed.is_empty());
        assert_eq!(drain(&mut rx_a), vec!["Alice: hi"]);
        assert_eq!(drain(&mut rx_b), vec!["Alice: hi"]);
        assert_eq!(broadcaster.history().len().await, 1);
    }

    #[tokio::test]
    async fn test_recipients_share_one_rendered_message() {
        let broadcaster = broadcaster();
        let (a, mut rx_a, _) = session(1, 8);
        let (b, mut rx_b, _) = session(2, 8);
        broadcaster.admit(a).await;
        broadcaster.admit(b).await;

        broadcaster.broadcast("same").await;
        let from_a = rx_a.recv().await.unwrap();
        let from_b = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&from_a, &from_b));
    }

    #[tokio::test]
    async fn test_admit_returns_backlog_without_live_duplicate() {
        let broadcaster = broadcaster();
        broadcaster.broadcast("one").await;
        broadcaster.broadcast("two").await;

        let (late, mut rx_late, _) = session(3, 8);
        let backlog = broadcaster.admit(late).await;
        broadcaster.broadcast("three").await;

        let replayed: Vec<_> = backlog.iter().map(|m| m.text().to_string()).collect();
        assert_eq!(replayed, vec!["one", "two"]);
        assert_eq!(drain(&mut rx_late), vec!["three"]);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_isolated_and_removes_session() {
        let broadcaster = broadcaster();
        let (healthy, mut rx_healthy, _) = session(1, 8);
        let (slow, _rx_slow, slow_cancel) = session(2, 1);
        let (gone, rx_gone, _) = session(3, 8);
        drop(rx_gone);
        broadcaster.admit(healthy).await;
        broadcaster.admit(slow).await;
        broadcaster.admit(gone).await;

        let first = broadcaster.broadcast("first").await;
        assert_eq!(first.delivered, 2);
        assert_eq!(first.failed, vec![ConnectionId::new(3)]);

        let second = broadcaster.broadcast("second").await;
        assert_eq!(second.delivered, 1);
        assert_eq!(second.failed, vec![ConnectionId::new(2)]);
        assert!(slow_cancel.is_cancelled());

        assert_eq!(drain(&mut rx_healthy), vec!["first", "second"]);
        assert_eq!(broadcaster.registry().len(), 1);
        assert_eq!(broadcaster.metrics().snapshot().delivery_failures, 2);
    }

    #[tokio::test]
    async fn test_disconnect_reports_whether_session_was_registered() {
        let broadcaster = broadcaster();
        let (a, _rx, cancel) = session(1, 8);
        broadcaster.admit(a).await;

        assert!(broadcaster.disconnect(ConnectionId::new(1)));
        assert!(cancel.is_cancelled());
        assert!(!broadcaster.disconnect(ConnectionId::new(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_broadcasts_keep_one_order_for_all() {
        let broadcaster = Arc::new(broadcaster());
        let mut receivers = Vec::new();
        for ordinal in 1..=3 {
            let (handle, rx, _) = session(ordinal, 512);
            broadcaster.admit(handle).await;
            receivers.push(rx);
        }

        let senders: Vec<_> = (0..4)
            .map(|sender| {
                let broadcaster = Arc::clone(&broadcaster);
                tokio::spawn(async move {
                    for i in 0..25 {
                        broadcaster.broadcast(format!("{sender}:{i}")).await;
                    }
                })
            })
            .collect();
        for task in senders {
            task.await.unwrap();
        }

        let history: Vec<_> = broadcaster
            .history()
            .snapshot()
            .await
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(history.len(), 100);
        for rx in &mut receivers {
            assert_eq!(drain(rx), history);
        }
    }
}
