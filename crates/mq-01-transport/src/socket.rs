//! # Socket
//!
//! A bidirectional, frame-oriented channel over one transport connection.
//!
//! A [`Socket`] is split into a read half and a write half so that a live
//! connection can run one reader task and one writer task. Until the greeting
//! completes, the socket is exclusively owned by whoever created it.

use async_trait::async_trait;
use shared_types::{Endpoint, Frame, SocketId, TransportError};
use std::fmt;

/// Read half of a transport connection.
#[async_trait]
pub trait FrameRead: Send {
    /// Receive the next frame.
    ///
    /// Returns `Disconnected` once the peer has closed.
    async fn recv(&mut self) -> Result<Frame, TransportError>;
}

/// Write half of a transport connection.
#[async_trait]
pub trait FrameWrite: Send {
    /// Write every frame in one transport write.
    async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError>;

    /// Close the write direction. The peer observes `Disconnected`.
    async fn close(&mut self);
}

/// Identity of one transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    /// Unique socket id
    pub id: SocketId,
    /// Listener endpoint (inbound) or dialed endpoint (outbound)
    pub endpoint: Endpoint,
    /// Peer description (`ip:port` or in-process peer id)
    pub peer: String,
    /// Whether this side initiated the connection
    pub outbound: bool,
}

impl SocketInfo {
    /// Describe a new connection.
    #[must_use]
    pub fn new(endpoint: Endpoint, peer: impl Into<String>, outbound: bool) -> Self {
        Self {
            id: SocketId::new(),
            endpoint,
            peer: peer.into(),
            outbound,
        }
    }
}

/// Framed connection before it is handed to a [`crate::Connection`].
pub struct Socket {
    info: SocketInfo,
    reader: Box<dyn FrameRead>,
    writer: Box<dyn FrameWrite>,
    closed: bool,
}

impl Socket {
    /// Assemble a socket from its halves.
    #[must_use]
    pub fn new(info: SocketInfo, reader: Box<dyn FrameRead>, writer: Box<dyn FrameWrite>) -> Self {
        Self {
            info,
            reader,
            writer,
            closed: false,
        }
    }

    /// Socket id.
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.info.id
    }

    /// Connection identity.
    #[must_use]
    pub fn info(&self) -> &SocketInfo {
        &self.info
    }

    /// Whether [`Socket::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one frame.
    pub async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.send_batch(vec![frame]).await
    }

    /// Send several frames in a single transport write.
    pub async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        if frames.is_empty() {
            return Ok(());
        }
        self.writer.send_batch(frames).await
    }

    /// Receive the next frame.
    pub async fn recv(&mut self) -> Result<Frame, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.reader.recv().await
    }

    /// Close the socket. Idempotent.
    pub async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.writer.close().await;
        }
    }

    /// Split into identity and halves.
    #[must_use]
    pub fn into_parts(self) -> (SocketInfo, Box<dyn FrameRead>, Box<dyn FrameWrite>) {
        (self.info, self.reader, self.writer)
    }

    /// Both halves at once, for concurrent send and receive.
    pub(crate) fn halves_mut(&mut self) -> (&mut Box<dyn FrameRead>, &mut Box<dyn FrameWrite>) {
        (&mut self.reader, &mut self.writer)
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("info", &self.info)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc;
    use crate::SocketConfig;
    use bytes::Bytes;
    use shared_types::MessageTypeId;

    #[tokio::test]
    async fn test_closed_socket_rejects_io() {
        let endpoint = Endpoint::in_proc("socket-closed-io");
        let config = SocketConfig::default();
        let mut listener = inproc::bind(&endpoint, &config).unwrap();
        let mut client = inproc::connect(&endpoint, &config).await.unwrap();
        let _server = crate::Listener::accept(&mut listener).await.unwrap();

        client.close().await;
        client.close().await;
        assert!(client.is_closed());

        let frame = Frame::message(MessageTypeId(1), Bytes::from_static(b"x"));
        assert_eq!(client.send(frame).await, Err(TransportError::Disconnected));
        assert_eq!(client.recv().await, Err(TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let endpoint = Endpoint::in_proc("socket-empty-batch");
        let config = SocketConfig::default();
        let mut listener = inproc::bind(&endpoint, &config).unwrap();
        let mut client = inproc::connect(&endpoint, &config).await.unwrap();
        let _server = crate::Listener::accept(&mut listener).await.unwrap();

        assert!(client.send_batch(Vec::new()).await.is_ok());
    }
}
