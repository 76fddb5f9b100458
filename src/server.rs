use crate::broadcast::Broadcaster;
use crate::error::RelayError;
use crate::history::MessageLog;
use crate::message::join_notice;
use crate::metrics::RelayMetrics;
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::session::ClientSession;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the accept loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Runtime settings for the relay, resolved from the loaded configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Outbound lines buffered per session before it counts as a failed recipient.
    pub outbound_queue_capacity: usize,
    /// Maximum number of history entries kept for replay; `None` keeps everything.
    pub history_limit: Option<usize>,
    /// How long `run` waits for sessions to wind down after shutdown.
    pub shutdown_grace: Duration,
    /// Longest accepted inbound line in bytes.
    pub max_line_length: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 1024,
            history_limit: None,
            shutdown_grace: Duration::from_secs(5),
            max_line_length: 64 * 1024,
        }
    }
}

impl From<&crate::config::Config> for RelayConfig {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            outbound_queue_capacity: cfg.server.outbound_queue_capacity,
            history_limit: cfg.server.history_limit,
            shutdown_grace: Duration::from_secs(cfg.server.shutdown_grace_secs),
            max_line_length: cfg.server.max_line_length,
        }
    }
}

/// Cloneable trigger for stopping a running relay.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The relay: owns the listening socket, the broadcaster and every session task.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: RelayConfig,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<RelayMetrics>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    accepted: u64,
}

impl RelayServer {
    /// Bind the listening socket. Failure here is fatal for the relay.
    pub async fn bind(addr: SocketAddr, config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let metrics = Arc::new(RelayMetrics::new());
        let broadcaster = Arc::new(Broadcaster::new(
            MessageLog::new(config.history_limit),
            ConnectionRegistry::new(),
            Arc::clone(&metrics),
        ));

        tracing::info!(%local_addr, history_limit = ?config.history_limit, "Relay listening");

        Ok(Self {
            listener,
            local_addr,
            config,
            broadcaster,
            metrics,
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
            accepted: 0,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Accept connections until shut down, then close every session and wait
    /// (bounded by `shutdown_grace`) for their tasks to finish.
    pub async fn run(mut self) {
        loop {
            let accepted = tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => self.accept_client(stream, peer_addr).await,
                Err(err) => {
                    self.metrics.increment_accept_errors();
                    tracing::warn!(error = %err, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        self.finish().await;
    }

    async fn accept_client(&mut self, stream: TcpStream, peer_addr: SocketAddr) {
        self.accepted += 1;
        let ordinal = self.accepted;
        let id = ConnectionId::new(ordinal);

        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(connection_id = %id, error = %err, "Failed to set TCP_NODELAY");
        }

        let (session, handle) = ClientSession::new(
            id,
            stream,
            peer_addr,
            self.config.outbound_queue_capacity,
            self.config.max_line_length,
            self.shutdown.child_token(),
        );

        let backlog = self.broadcaster.admit(handle).await;
        self.metrics.increment_connections();
        tracing::info!(
            connection_id = %id,
            %peer_addr,
            ordinal,
            backlog = backlog.len(),
            "Client connected"
        );

        self.broadcaster.broadcast(join_notice(ordinal)).await;

        let broadcaster = Arc::clone(&self.broadcaster);
        self.sessions.spawn(session.run(backlog, broadcaster));
    }

    async fn finish(self) {
        let Self {
            listener,
            local_addr,
            config,
            broadcaster,
            metrics,
            sessions,
            ..
        } = self;
        drop(listener);

        let closed = broadcaster.disconnect_all();
        sessions.close();
        tracing::info!(%local_addr, sessions = closed, "Relay shutting down");

        if tokio::time::timeout(config.shutdown_grace, sessions.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = sessions.len(),
                grace_secs = config.shutdown_grace.as_secs(),
                "Sessions still running after shutdown grace period"
            );
        }

        let snapshot = metrics.snapshot();
        tracing::info!(
            connections_accepted = snapshot.connections_accepted,
            messages_broadcast = snapshot.messages_broadcast,
            lines_replayed = snapshot.lines_replayed,
            delivery_failures = snapshot.delivery_failures,
            accept_errors = snapshot.accept_errors,
            "Relay stopped"
        );
    }
}
