//! # Tcp Transport
//!
//! Length-prefixed frames over a `TcpStream` (see [`crate::wire`]).

use crate::config::SocketConfig;
use crate::listener::Listener;
use crate::socket::{FrameRead, FrameWrite, Socket, SocketInfo};
use crate::wire;
use async_trait::async_trait;
use bytes::BytesMut;
use shared_types::{Endpoint, Frame, TransportError};
use std::io::ErrorKind;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

/// Read half of a Tcp socket.
pub struct TcpFrameReader {
    inner: BufReader<OwnedReadHalf>,
    max_frame_size: usize,
}

#[async_trait]
impl FrameRead for TcpFrameReader {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        wire::read_frame(&mut self.inner, self.max_frame_size).await
    }
}

/// Write half of a Tcp socket.
pub struct TcpFrameWriter {
    inner: OwnedWriteHalf,
    buffer: BytesMut,
    max_frame_size: usize,
}

#[async_trait]
impl FrameWrite for TcpFrameWriter {
    async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        self.buffer.clear();
        for frame in &frames {
            wire::encode_frame(frame, &mut self.buffer, self.max_frame_size)?;
        }
        self.inner.write_all(&self.buffer).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            debug!(error = %e, "Tcp shutdown failed");
        }
    }
}

fn into_socket(
    stream: TcpStream,
    endpoint: Endpoint,
    peer: String,
    outbound: bool,
    config: &SocketConfig,
) -> Result<Socket, TransportError> {
    stream.set_nodelay(true)?;
    let (read, write) = stream.into_split();
    Ok(Socket::new(
        SocketInfo::new(endpoint, peer, outbound),
        Box::new(TcpFrameReader {
            inner: BufReader::new(read),
            max_frame_size: config.max_frame_size,
        }),
        Box::new(TcpFrameWriter {
            inner: write,
            buffer: BytesMut::new(),
            max_frame_size: config.max_frame_size,
        }),
    ))
}

/// Dial a Tcp endpoint.
///
/// # Errors
///
/// `ConnectFailed` when the peer refuses, `Timeout` when
/// `config.connect_timeout` elapses first.
pub async fn connect(endpoint: &Endpoint, config: &SocketConfig) -> Result<Socket, TransportError> {
    let address = endpoint.socket_address();
    let stream = match timeout(config.connect_timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })
        }
        Err(_) => return Err(TransportError::Timeout),
    };

    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or(address);
    debug!(%endpoint, %peer, "Tcp connected");
    into_socket(stream, endpoint.clone(), peer, true, config)
}

/// Bound Tcp listener.
pub struct TcpListenerAdapter {
    listener: TcpListener,
    local: Endpoint,
    config: SocketConfig,
}

/// Bind a Tcp listener. Port 0 picks a free port; the bound endpoint is
/// available from [`Listener::local_endpoint`].
///
/// # Errors
///
/// `AddressInUse` if another listener holds the address, `BindFailed`
/// otherwise.
pub async fn bind(
    endpoint: &Endpoint,
    config: &SocketConfig,
) -> Result<TcpListenerAdapter, TransportError> {
    let listener = TcpListener::bind(endpoint.socket_address())
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => TransportError::AddressInUse(endpoint.clone()),
            _ => TransportError::BindFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            },
        })?;

    let local = endpoint.with_port(listener.local_addr()?.port());
    info!(endpoint = %local, "Tcp listener bound");
    Ok(TcpListenerAdapter {
        listener,
        local,
        config: config.clone(),
    })
}

#[async_trait]
impl Listener for TcpListenerAdapter {
    async fn accept(&mut self) -> Result<Socket, TransportError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(endpoint = %self.local, %peer, "Tcp accepted");
        into_socket(stream, self.local.clone(), peer.to_string(), false, &self.config)
    }

    fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }
}
