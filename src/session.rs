//! Per-connection session: one read loop feeding the broadcaster and one
//! writer draining the session's outbound queue onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::message::SharedMessage;
use crate::registry::{ConnectionId, SessionHandle};

/// Upper bound on the final flush when a session ends.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed its side of the stream.
    PeerClosed,
    /// Reading or decoding a line failed.
    ReadFailed,
    /// Writing to the peer failed.
    WriteFailed,
    /// The session was cancelled (relay shutdown or delivery failure).
    Cancelled,
}

/// Server-side state of one accepted connection.
pub struct ClientSession {
    id: ConnectionId,
    peer_addr: SocketAddr,
    lines: FramedRead<OwnedReadHalf, LinesCodec>,
    sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    outbound: mpsc::Receiver<SharedMessage>,
    cancel: CancellationToken,
}

impl ClientSession {
    /// Wrap an accepted stream. The returned handle is what the registry keeps.
    ///
    /// An inbound line longer than `max_line_length` bytes ends the session.
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        queue_capacity: usize,
        max_line_length: usize,
        cancel: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = SessionHandle::new(id, peer_addr, tx, cancel.clone());
        let session = Self {
            id,
            peer_addr,
            lines: FramedRead::new(
                read_half,
                LinesCodec::new_with_max_length(max_line_length),
            ),
            sink: FramedWrite::new(write_half, LinesCodec::new()),
            outbound: rx,
            cancel,
        };
        (session, handle)
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Replay `backlog`, then relay lines until the peer goes away or the
    /// session is cancelled. Always leaves the session unregistered and the
    /// connection closed.
    pub async fn run(
        self,
        backlog: Vec<SharedMessage>,
        broadcaster: Arc<Broadcaster>,
    ) -> SessionEnd {
        let Self {
            id,
            peer_addr,
            lines,
            sink,
            outbound,
            cancel,
        } = self;

        let (read_end, write_end) = tokio::join!(
            read_loop(id, lines, &broadcaster, &cancel),
            write_loop(id, sink, outbound, backlog, &broadcaster, &cancel),
        );

        broadcaster.disconnect(id);
        broadcaster.metrics().record_session_closed();

        let end = match (read_end, write_end) {
            (SessionEnd::Cancelled, other) => other,
            (first, _) => first,
        };
        info!(connection_id = %id, %peer_addr, reason = ?end, "Session closed");
        end
    }
}

async fn read_loop(
    id: ConnectionId,
    mut lines: FramedRead<OwnedReadHalf, LinesCodec>,
    broadcaster: &Broadcaster,
    cancel: &CancellationToken,
) -> SessionEnd {
    let end = loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break SessionEnd::Cancelled,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => {
                broadcaster.broadcast(line).await;
            }
            Some(Err(err)) => {
                warn!(connection_id = %id, error = %err, "Read failed");
                break SessionEnd::ReadFailed;
            }
            None => {
                debug!(connection_id = %id, "Peer closed connection");
                break SessionEnd::PeerClosed;
            }
        }
    };

    cancel.cancel();
    end
}

async fn write_loop(
    id: ConnectionId,
    mut sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    mut outbound: mpsc::Receiver<SharedMessage>,
    backlog: Vec<SharedMessage>,
    broadcaster: &Broadcaster,
    cancel: &CancellationToken,
) -> SessionEnd {
    let end = 'session: {
        if !backlog.is_empty() {
            let replayed = backlog.len();
            let result = tokio::select! {
                () = cancel.cancelled() => break 'session SessionEnd::Cancelled,
                result = replay_backlog(&mut sink, &backlog) => result,
            };
            if let Err(err) = result {
                warn!(connection_id = %id, error = %err, "Backlog replay failed");
                break 'session SessionEnd::WriteFailed;
            }
            broadcaster.metrics().add_lines_replayed(replayed as u64);
            debug!(connection_id = %id, replayed, "Backlog replayed");
        }

        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break 'session SessionEnd::Cancelled,
                message = outbound.recv() => match message {
                    Some(message) => message,
                    None => break 'session SessionEnd::Cancelled,
                },
            };

            // A peer that stops reading parks the write; cancellation must still win.
            let sent = tokio::select! {
                () = cancel.cancelled() => break 'session SessionEnd::Cancelled,
                sent = sink.send(message.rendered()) => sent,
            };
            if let Err(err) = sent {
                warn!(connection_id = %id, error = %err, "Write failed");
                break 'session SessionEnd::WriteFailed;
            }
        }
    };

    cancel.cancel();
    outbound.close();
    // Best effort FIN; the peer may already be gone or not reading.
    if timeout(CLOSE_TIMEOUT, SinkExt::<&str>::close(&mut sink))
        .await
        .is_err()
    {
        debug!(connection_id = %id, "Timed out flushing on close");
    }
    end
}

async fn replay_backlog(
    sink: &mut FramedWrite<OwnedWriteHalf, LinesCodec>,
    backlog: &[SharedMessage],
) -> Result<(), LinesCodecError> {
    for message in backlog {
        sink.feed(message.rendered()).await?;
    }
    SinkExt::<&str>::flush(sink).await
}
