//! # Accept Loop
//!
//! Accepts inbound sockets for one listener and runs each greeting in its
//! own task, so a slow or silent peer never blocks later connections.

use crate::greeting::{negotiate, ExpectedRoles};
use crate::listener::Listener;
use crate::signal::Shutdown;
use crate::socket::Socket;
use shared_types::{Endpoint, NodeType, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Greeting parameters for inbound sockets.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Role this side declares
    pub local: NodeType,
    /// Roles accepted from peers
    pub expected: ExpectedRoles,
    /// Greeting deadline
    pub timeout: Duration,
}

type VerifiedCallback = Arc<dyn Fn(Socket, NodeType) + Send + Sync>;

/// Background accept loop for one bound endpoint.
///
/// Dropping the loop stops it; the listener is released once the task exits.
pub struct AcceptLoop {
    endpoint: Endpoint,
    shutdown: Shutdown,
    task: Option<JoinHandle<()>>,
}

impl AcceptLoop {
    /// Start accepting. `on_verified` receives every socket whose greeting
    /// succeeded, with the peer's role.
    pub fn spawn<F>(listener: Box<dyn Listener>, handshake: Handshake, on_verified: F) -> Self
    where
        F: Fn(Socket, NodeType) + Send + Sync + 'static,
    {
        let endpoint = listener.local_endpoint().clone();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(accept_loop(
            listener,
            handshake,
            Arc::new(on_verified),
            shutdown.clone(),
        ));

        Self {
            endpoint,
            shutdown,
            task: Some(task),
        }
    }

    /// Bound endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether the loop has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Stop accepting and wait until the listener is released.
    pub async fn stop(&mut self) {
        self.shutdown.trigger();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(endpoint = %self.endpoint, error = %e, "Accept loop ended abnormally");
            }
        }
    }
}

impl Drop for AcceptLoop {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn accept_loop(
    mut listener: Box<dyn Listener>,
    handshake: Handshake,
    on_verified: VerifiedCallback,
    shutdown: Shutdown,
) {
    let endpoint = listener.local_endpoint().clone();
    let mut stop = shutdown.listener();
    info!(%endpoint, local = %handshake.local, "Accepting connections");

    loop {
        let accepted = tokio::select! {
            _ = stop.wait() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(socket) => {
                let handshake = handshake.clone();
                let on_verified = Arc::clone(&on_verified);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let socket_id = socket.id();
                    let negotiated = negotiate(
                        socket,
                        handshake.local,
                        &handshake.expected,
                        handshake.timeout,
                    )
                    .await;

                    match negotiated {
                        Ok((mut socket, _)) if shutdown.is_triggered() => {
                            debug!(%socket_id, "Listener closed during greeting");
                            socket.close().await;
                        }
                        Ok((socket, remote)) => on_verified(socket, remote),
                        Err(e) => debug!(%socket_id, error = %e, "Inbound greeting failed"),
                    }
                });
            }
            Err(TransportError::Disconnected) => break,
            Err(e) => {
                warn!(%endpoint, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    debug!(%endpoint, "Accept loop stopped");
}
