//! Responder and ServiceQueue notifications.

use shared_bus::{BusEvent, EventTopic};
use shared_types::{Endpoint, NodeType, SocketId};

/// Identity of an accepted peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Socket id
    pub id: SocketId,
    /// Peer address
    pub peer: String,
    /// Role the peer declared
    pub remote_role: NodeType,
    /// Bound endpoint the peer arrived on
    pub endpoint: Endpoint,
}

impl PeerInfo {
    /// Whether the peer is a remote ServiceQueue worker.
    #[must_use]
    pub fn is_worker(&self) -> bool {
        self.remote_role == NodeType::ServiceQueueWorker
    }
}

/// Server-side connection notifications.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A peer completed the greeting.
    ClientConnected(PeerInfo),
    /// A peer's connection ended. Fired once per connection.
    ClientDisconnected(PeerInfo),
    /// An endpoint started accepting.
    Bound(Endpoint),
    /// An endpoint stopped accepting.
    Unbound(Endpoint),
}

impl BusEvent for ServerEvent {
    fn topic(&self) -> EventTopic {
        match self {
            Self::ClientConnected(_) | Self::ClientDisconnected(_) => EventTopic::Connection,
            Self::Bound(_) | Self::Unbound(_) => EventTopic::Lifecycle,
        }
    }
}
