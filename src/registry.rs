use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::message::SharedMessage;

/// Identity assigned to a connection at accept time.
///
/// Identities are the 1-based accept ordinal, so ordering by id is ordering by
/// connection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[inline]
    pub const fn new(ordinal: u64) -> Self {
        Self(ordinal)
    }

    #[inline]
    pub const fn ordinal(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a message could not be handed to a session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("session is closed")]
    Closed,
}

/// The registry's view of a live session: where to enqueue outbound lines and
/// how to tear the session down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    peer_addr: SocketAddr,
    sender: mpsc::Sender<SharedMessage>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        sender: mpsc::Sender<SharedMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr,
            sender,
            cancel,
        }
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Enqueue without waiting. Never blocks the caller on a slow peer.
    pub fn deliver(&self, message: &SharedMessage) -> Result<(), DeliveryError> {
        if self.cancel.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.sender
            .try_send(Arc::clone(message))
            .map_err(|err| match err {
                TrySendError::Full(_) => DeliveryError::QueueFull,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Signal the session's read and write loops to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.sender.is_closed()
    }
}

/// Set of live sessions, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<ConnectionId, SessionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id(), handle);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<SessionHandle> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Detached copy of the current sessions in connection order.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        let mut sessions: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(SessionHandle::id);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove and close every session.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let mut closed = 0;
        for id in ids {
            if let Some(handle) = self.remove(id) {
                handle.close();
                closed += 1;
            }
        }
        closed
    }
}
