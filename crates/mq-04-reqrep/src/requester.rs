//! # Requester
//!
//! Sends requests to a Responder or ServiceQueue and waits for the
//! correlated reply.
//!
//! Any number of requests may be in flight on one connection. Each request
//! frame carries a fresh correlation identifier; a background task matches
//! replies to waiters, so replies may arrive in any order.

use crate::pending::PendingRequests;
use mq_01_transport::{dial, Connection, ConnectionEvent, ExpectedRoles, SocketConfig};
use mq_02_serialization::{Message, SerializationRegistry};
use mq_telemetry::metrics::{REQUESTS, REQUEST_DURATION};
use shared_types::{
    Endpoint, ErrorCode, Frame, FrameKind, MqError, NodeType, SocketId, TransportError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Request client bound to one connection.
pub struct Requester {
    connection: Connection,
    endpoint: Endpoint,
    registry: Arc<SerializationRegistry>,
    pending: Arc<PendingRequests>,
}

impl Requester {
    /// Connect to a Responder or ServiceQueue and complete the greeting.
    ///
    /// Declares `Requester`; accepts `Responder`, `ServiceQueue` and
    /// `config.additional_remote_roles`.
    pub async fn connect(
        endpoint: &Endpoint,
        registry: Arc<SerializationRegistry>,
        config: SocketConfig,
    ) -> Result<Self, MqError> {
        let expected = ExpectedRoles::new(NodeType::Responder)
            .with_additional([NodeType::ServiceQueue])
            .with_additional(config.additional_remote_roles.iter().copied());
        let (socket, remote) = dial(endpoint, &config, NodeType::Requester, &expected).await?;

        let (events, receiver) = mpsc::channel(config.inbound_capacity.max(1));
        let connection = Connection::spawn(socket, NodeType::Requester, remote, &config, events);
        let pending = Arc::new(PendingRequests::new());
        tokio::spawn(response_loop(Arc::clone(&pending), receiver));

        info!(%endpoint, socket_id = %connection.id(), remote = %remote, "Requester connected");
        Ok(Self {
            connection,
            endpoint: endpoint.clone(),
            registry,
            pending,
        })
    }

    /// Send `message` and wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// - `Timeout`: no reply in time; a late reply is discarded
    /// - `Disconnected`: the connection ended first
    /// - `Remote`: the server reported a failure (no handler, handler error)
    /// - `QueueFull`: a service queue turned the request away
    /// - `Serialization`: the request or reply type is not registered
    pub async fn request(
        &self,
        message: &dyn Message,
        timeout: Duration,
    ) -> Result<Arc<dyn Message>, MqError> {
        let started = Instant::now();
        let payload = self.registry.serialize(message)?;
        let (correlation_id, reply) = self.pending.register()?;
        let frame = Frame::request(message.message_type(), correlation_id, payload);

        let exchange = async {
            self.connection.send(frame).await.map_err(steady_state)?;
            reply.await.map_err(|_| MqError::Disconnected)?
        };
        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MqError::Timeout),
        };
        if outcome.is_err() {
            self.pending.cancel(correlation_id);
        }

        let result = outcome.and_then(|frame| self.decode_reply(&frame));
        REQUEST_DURATION.observe(started.elapsed().as_secs_f64());
        REQUESTS.with_label_values(&[outcome_label(&result)]).inc();
        debug!(
            correlation_id,
            message_type = %message.message_type(),
            ok = result.is_ok(),
            "Request finished"
        );
        result
    }

    fn decode_reply(&self, frame: &Frame) -> Result<Arc<dyn Message>, MqError> {
        match frame.kind {
            FrameKind::Response => Ok(self.registry.deserialize_frame(frame)?),
            FrameKind::Error => match (frame.error_code(), frame.error_reason()) {
                (Some(ErrorCode::QueueFull), _) => Err(MqError::QueueFull),
                (_, Some(reason)) => Err(MqError::Remote(reason)),
                (_, None) => Err(MqError::Remote("unknown error".to_string())),
            },
            other => Err(MqError::Remote(format!("unexpected reply kind {other:?}"))),
        }
    }

    /// Close the connection; in-flight requests fail with `Disconnected`.
    /// Waits at most `timeout`. Idempotent.
    pub async fn disconnect(&self, timeout: Duration) {
        self.connection.close();
        if tokio::time::timeout(timeout, self.connection.closed())
            .await
            .is_err()
        {
            warn!(endpoint = %self.endpoint, "Connection did not close in time");
        }
        self.pending.fail_all();
    }

    /// Whether the connection has ended.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.connection.is_closed()
    }

    /// Wait until the connection has closed.
    pub async fn closed(&self) {
        self.connection.closed().await;
    }

    /// Requests awaiting a reply.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Role of the server.
    #[must_use]
    pub fn remote_role(&self) -> NodeType {
        self.connection.remote_role()
    }

    /// Server endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Local socket id.
    #[must_use]
    pub fn socket_id(&self) -> SocketId {
        self.connection.id()
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        self.connection.close();
    }
}

fn steady_state(err: TransportError) -> MqError {
    match err {
        TransportError::Disconnected => MqError::Disconnected,
        TransportError::Timeout => MqError::Timeout,
        other => MqError::Transport(other),
    }
}

fn outcome_label(result: &Result<Arc<dyn Message>, MqError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(MqError::Remote(_)) => "remote_error",
        Err(MqError::Timeout) => "timeout",
        Err(MqError::Disconnected) => "disconnected",
        Err(MqError::QueueFull) => "queue_full",
        Err(_) => "error",
    }
}

async fn response_loop(pending: Arc<PendingRequests>, mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Frame { frame, .. }
                if matches!(frame.kind, FrameKind::Response | FrameKind::Error) =>
            {
                pending.complete(frame);
            }
            ConnectionEvent::Frame { connection, frame } => {
                debug!(socket_id = %connection.id(), kind = ?frame.kind, "Ignoring unsolicited frame");
            }
            ConnectionEvent::Closed { connection } => {
                debug!(socket_id = %connection.id(), in_flight = pending.len(), "Requester disconnected");
                break;
            }
        }
    }
    pending.fail_all();
}
