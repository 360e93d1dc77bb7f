//! # Live Connection
//!
//! A verified socket running one reader task and one writer task.
//!
//! - Writes from any number of callers are queued as whole batches and
//!   written by the single writer task, so frames never interleave.
//! - The reader task forwards every inbound frame to the owning engine's
//!   event channel and emits exactly one [`ConnectionEvent::Closed`] when the
//!   connection ends, whichever side ended it.

use crate::config::SocketConfig;
use crate::signal::{Shutdown, ShutdownListener};
use crate::socket::{FrameRead, FrameWrite, Socket, SocketInfo};
use mq_telemetry::metrics::{CONNECTIONS_CLOSED, CONNECTIONS_ESTABLISHED, FRAMES_RECEIVED, FRAMES_SENT};
use shared_types::{ConnectionState, Frame, FrameKind, NodeType, SocketId, TransportError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Notification from a connection's reader task.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Application frame from the peer.
    Frame {
        /// Receiving connection
        connection: Connection,
        /// Frame as read
        frame: Frame,
    },
    /// Connection ended. Sent once, after the last `Frame`.
    Closed {
        /// Ended connection
        connection: Connection,
    },
}

struct ConnectionInner {
    info: SocketInfo,
    local_role: NodeType,
    remote_role: NodeType,
    outbound: mpsc::Sender<Vec<Frame>>,
    state: watch::Sender<ConnectionState>,
    shutdown: Shutdown,
    send_timeout: Duration,
}

/// Cloneable handle to a live connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Start the reader and writer tasks for a verified socket.
    ///
    /// Inbound frames and the final `Closed` go to `events`.
    pub fn spawn(
        socket: Socket,
        local_role: NodeType,
        remote_role: NodeType,
        config: &SocketConfig,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let (info, reader, writer) = socket.into_parts();
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Connected);
        let shutdown = Shutdown::new();

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                info,
                local_role,
                remote_role,
                outbound,
                state,
                shutdown: shutdown.clone(),
                send_timeout: config.send_timeout,
            }),
        };

        CONNECTIONS_ESTABLISHED
            .with_label_values(&[local_role.as_str()])
            .inc();
        debug!(
            socket_id = %connection.id(),
            peer = %connection.info().peer,
            local = %local_role,
            remote = %remote_role,
            "Connection established"
        );

        tokio::spawn(write_loop(
            writer,
            outbound_rx,
            shutdown.clone(),
            shutdown.listener(),
            connection.id(),
        ));
        tokio::spawn(read_loop(connection.clone(), reader, shutdown.listener(), events));
        connection
    }

    /// Socket id.
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.inner.info.id
    }

    /// Connection identity.
    #[must_use]
    pub fn info(&self) -> &SocketInfo {
        &self.inner.info
    }

    /// Role this side declared.
    #[must_use]
    pub fn local_role(&self) -> NodeType {
        self.inner.local_role
    }

    /// Role the peer declared and the greeting verified.
    #[must_use]
    pub fn remote_role(&self) -> NodeType {
        self.inner.remote_role
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Whether the connection is closing or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    /// Queue one frame for the writer task.
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.send_batch(vec![frame]).await
    }

    /// Queue frames to be written in one transport write.
    ///
    /// # Errors
    ///
    /// `Disconnected` once the connection is closing, `Timeout` if the writer
    /// queue stays full for the configured send timeout.
    pub async fn send_batch(&self, frames: Vec<Frame>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        if frames.is_empty() {
            return Ok(());
        }
        match timeout(self.inner.send_timeout, self.inner.outbound.send(frames)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Close the connection. Idempotent; the `Closed` event follows
    /// asynchronously.
    pub fn close(&self) {
        if self.inner.shutdown.trigger() {
            debug!(socket_id = %self.id(), "Closing connection");
        }
    }

    /// Wait until the connection has fully closed.
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|s| s.is_terminal()).await;
    }

    fn mark_disconnected(&self) {
        self.inner.shutdown.trigger();
        self.inner.state.send_replace(ConnectionState::Disconnected);
        CONNECTIONS_CLOSED
            .with_label_values(&[self.inner.local_role.as_str()])
            .inc();
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("peer", &self.inner.info.peer)
            .field("remote_role", &self.inner.remote_role)
            .field("state", &self.state())
            .finish()
    }
}

async fn write_loop(
    mut writer: Box<dyn FrameWrite>,
    mut outbound: mpsc::Receiver<Vec<Frame>>,
    shutdown: Shutdown,
    mut stop: ShutdownListener,
    socket_id: SocketId,
) {
    loop {
        let batch = tokio::select! {
            _ = stop.wait() => break,
            batch = outbound.recv() => batch,
        };
        let Some(frames) = batch else { break };

        let count = frames.len();
        if let Err(e) = writer.send_batch(frames).await {
            warn!(%socket_id, error = %e, "Write failed, closing connection");
            break;
        }
        FRAMES_SENT.inc_by(count as f64);
        trace!(%socket_id, count, "Batch written");
    }

    shutdown.trigger();
    writer.close().await;
}

async fn read_loop(
    connection: Connection,
    mut reader: Box<dyn FrameRead>,
    mut stop: ShutdownListener,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let socket_id = connection.id();
    loop {
        let result = tokio::select! {
            _ = stop.wait() => break,
            result = reader.recv() => result,
        };

        match result {
            Ok(frame) if frame.kind == FrameKind::Greeting => {
                warn!(%socket_id, "Greeting after handshake, closing connection");
                break;
            }
            Ok(frame) => {
                FRAMES_RECEIVED.inc();
                trace!(
                    %socket_id,
                    kind = ?frame.kind,
                    message_type = %frame.message_type,
                    correlation_id = frame.correlation_id,
                    "Frame received"
                );
                let event = ConnectionEvent::Frame {
                    connection: connection.clone(),
                    frame,
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(TransportError::Disconnected) => {
                debug!(%socket_id, "Peer disconnected");
                break;
            }
            Err(e) => {
                warn!(%socket_id, error = %e, "Read failed, closing connection");
                break;
            }
        }
    }

    connection.mark_disconnected();
    let _ = events.send(ConnectionEvent::Closed { connection }).await;
}
