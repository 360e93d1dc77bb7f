//! # Listener
//!
//! Transport-independent entry points: dial an endpoint or bind a listener,
//! picking the implementation from the endpoint's transport kind.

use crate::config::SocketConfig;
use crate::socket::Socket;
use crate::{inproc, tcp};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use shared_types::{Endpoint, TransportError, TransportKind};

/// Source of inbound sockets for one bound endpoint.
///
/// Dropping the listener releases the address.
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next inbound connection. Cancel-safe.
    async fn accept(&mut self) -> Result<Socket, TransportError>;

    /// Endpoint actually bound (the real port when bound with port 0).
    fn local_endpoint(&self) -> &Endpoint;
}

impl dyn Listener {
    /// Lazily yield inbound sockets, one per `accept`.
    pub fn incoming(self: Box<Self>) -> BoxStream<'static, Result<Socket, TransportError>> {
        stream::unfold(self, |mut listener| async move {
            let next = listener.accept().await;
            Some((next, listener))
        })
        .boxed()
    }
}

/// Open a connection to `endpoint`.
pub async fn connect(endpoint: &Endpoint, config: &SocketConfig) -> Result<Socket, TransportError> {
    match endpoint.transport() {
        TransportKind::Tcp => tcp::connect(endpoint, config).await,
        TransportKind::InProc => inproc::connect(endpoint, config).await,
    }
}

/// Bind a listener on `endpoint`.
pub async fn listen(
    endpoint: &Endpoint,
    config: &SocketConfig,
) -> Result<Box<dyn Listener>, TransportError> {
    Ok(match endpoint.transport() {
        TransportKind::Tcp => Box::new(tcp::bind(endpoint, config).await?),
        TransportKind::InProc => Box::new(inproc::bind(endpoint, config)?),
    })
}
