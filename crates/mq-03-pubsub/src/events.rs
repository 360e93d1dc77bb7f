//! Engine notifications delivered through the shared event bus.

use mq_01_transport::Connection;
use mq_02_serialization::Message;
use shared_bus::{BusEvent, EventTopic};
use shared_types::{Endpoint, NodeType, SocketId};
use std::sync::Arc;

/// A subscriber connection as seen by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandle {
    connection: Connection,
    endpoint: Endpoint,
}

impl ClientHandle {
    pub(crate) fn new(connection: Connection, endpoint: Endpoint) -> Self {
        Self {
            connection,
            endpoint,
        }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Socket id.
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.connection.id()
    }

    /// Peer address.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.connection.info().peer
    }

    /// Role the client declared.
    #[must_use]
    pub fn remote_role(&self) -> NodeType {
        self.connection.remote_role()
    }

    /// Bound endpoint the client arrived on.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.connection.is_closed()
    }
}

/// Publisher notifications.
#[derive(Debug, Clone)]
pub enum PublisherEvent {
    /// A client completed the greeting.
    ClientConnected(ClientHandle),
    /// A client left, failed a write, or was closed by `unbind`/`shutdown`.
    ClientDisconnected(ClientHandle),
    /// A client sent a message upstream.
    MessageReceived {
        /// Sender
        client: ClientHandle,
        /// Decoded message
        message: Arc<dyn Message>,
    },
}

impl BusEvent for PublisherEvent {
    fn topic(&self) -> EventTopic {
        match self {
            Self::ClientConnected(_) | Self::ClientDisconnected(_) => EventTopic::Connection,
            Self::MessageReceived { .. } => EventTopic::Message,
        }
    }
}

/// Subscriber notifications.
#[derive(Debug, Clone)]
pub enum SubscriberEvent {
    /// A broadcast arrived.
    MessageReceived(Arc<dyn Message>),
    /// The connection ended. Fired once.
    Disconnected,
}

impl BusEvent for SubscriberEvent {
    fn topic(&self) -> EventTopic {
        match self {
            Self::MessageReceived(_) => EventTopic::Message,
            Self::Disconnected => EventTopic::Connection,
        }
    }
}
