use std::net::SocketAddr;
use thiserror::Error;

/// Errors that stop the relay as a whole.
///
/// Per-connection failures never surface here; they end the affected session.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind relay listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
