//! # Responder
//!
//! Answers requests from connected requesters through a
//! [`WorkerDefinition`].
//!
//! Requests on one connection are answered strictly in arrival order; each
//! connection has its own serving task, so connections do not wait on each
//! other.

use crate::events::{PeerInfo, ServerEvent};
use crate::server::{ServeFn, ServerCore};
use crate::worker::WorkerDefinition;
use futures::FutureExt;
use mq_01_transport::{Connection, ConnectionEvent, ExpectedRoles, SocketConfig};
use mq_02_serialization::SerializationRegistry;
use shared_bus::{EventFilter, EventStream, Subscription};
use shared_types::{Endpoint, FrameKind, MqError, NodeType};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Request/response server. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Responder {
    core: Arc<ServerCore>,
    worker: Arc<WorkerDefinition>,
    registry: Arc<SerializationRegistry>,
}

impl Responder {
    /// Create a responder dispatching through `worker`.
    #[must_use]
    pub fn new(
        registry: Arc<SerializationRegistry>,
        worker: WorkerDefinition,
        config: SocketConfig,
    ) -> Self {
        Self {
            core: ServerCore::new(NodeType::Responder, config),
            worker: Arc::new(worker),
            registry,
        }
    }

    /// Start accepting requesters on `endpoint`.
    ///
    /// Accepts `Requester` plus `additional_remote_roles`. Returns the
    /// endpoint actually bound.
    pub async fn bind(&self, endpoint: &Endpoint) -> Result<Endpoint, MqError> {
        let expected = ExpectedRoles::new(NodeType::Requester)
            .with_additional(self.core.config().additional_remote_roles.iter().copied());

        let worker = Arc::clone(&self.worker);
        let registry = Arc::clone(&self.registry);
        let serve: ServeFn = Arc::new(
            move |connection: Connection, events: mpsc::Receiver<ConnectionEvent>| {
                serve_requests(connection, events, Arc::clone(&worker), Arc::clone(&registry)).boxed()
            },
        );
        self.core.bind(endpoint, expected, serve).await
    }

    /// Stop accepting on `endpoint` and close its connections. Idempotent.
    pub async fn unbind(&self, endpoint: &Endpoint) {
        self.core.unbind(endpoint).await;
    }

    /// Unbind everything and close all connections. Idempotent.
    pub async fn shutdown(&self) {
        self.core.shutdown().await;
    }

    /// Number of connected requesters.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.core.peer_count()
    }

    /// Snapshot of connected requesters.
    #[must_use]
    pub fn clients(&self) -> Vec<PeerInfo> {
        self.core.peers()
    }

    /// Endpoints currently bound.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.core.endpoints()
    }

    /// Dispatch table in use.
    #[must_use]
    pub fn worker(&self) -> &WorkerDefinition {
        &self.worker
    }

    /// Observe all responder events from now on.
    #[must_use]
    pub fn events(&self) -> Subscription<ServerEvent> {
        self.core.events().subscribe(EventFilter::all())
    }

    /// Observe selected responder events as a stream.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream<ServerEvent> {
        self.core.events().event_stream(filter)
    }
}

/// Answer `Request` frames on `connection` one at a time until it closes.
pub(crate) async fn serve_requests(
    connection: Connection,
    mut events: mpsc::Receiver<ConnectionEvent>,
    worker: Arc<WorkerDefinition>,
    registry: Arc<SerializationRegistry>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Frame { frame, .. } if frame.kind == FrameKind::Request => {
                let reply = worker.process(&registry, &frame).await;
                trace!(
                    socket_id = %connection.id(),
                    correlation_id = reply.correlation_id,
                    kind = ?reply.kind,
                    "Replying"
                );
                if let Err(e) = connection.send(reply).await {
                    warn!(socket_id = %connection.id(), error = %e, "Reply failed, closing connection");
                    connection.close();
                    break;
                }
            }
            ConnectionEvent::Frame { frame, .. } => {
                debug!(socket_id = %connection.id(), kind = ?frame.kind, "Ignoring non-request frame");
            }
            ConnectionEvent::Closed { .. } => break,
        }
    }
}
