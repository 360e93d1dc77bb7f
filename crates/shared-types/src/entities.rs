//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Roles**: `NodeType`
//! - **Identity**: `SocketId`, `MessageTypeId`
//! - **Lifecycle**: `ConnectionState`

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// ROLES
// =============================================================================

/// Declared role of a connection endpoint, exchanged in the greeting.
///
/// The wire code is a single byte; unknown codes are rejected at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum NodeType {
    /// No role declared.
    #[default]
    Unspecified = 0,
    /// Broadcasts to subscribers.
    Publisher = 1,
    /// Receives broadcasts.
    Subscriber = 2,
    /// Sends requests and awaits replies.
    Requester = 3,
    /// Answers requests.
    Responder = 4,
    /// Distributes requests over a worker pool.
    ServiceQueue = 5,
    /// Remote worker attached to a service queue.
    ServiceQueueWorker = 6,
    /// Forwarding intermediary.
    Proxy = 7,
}

impl NodeType {
    /// All declared roles, in wire-code order.
    pub const ALL: [NodeType; 8] = [
        NodeType::Unspecified,
        NodeType::Publisher,
        NodeType::Subscriber,
        NodeType::Requester,
        NodeType::Responder,
        NodeType::ServiceQueue,
        NodeType::ServiceQueueWorker,
        NodeType::Proxy,
    ];

    /// Wire code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Lower-case role name used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
            Self::Requester => "requester",
            Self::Responder => "responder",
            Self::ServiceQueue => "service-queue",
            Self::ServiceQueueWorker => "service-queue-worker",
            Self::Proxy => "proxy",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Message-type identifier carried in every application frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTypeId(pub u32);

impl MessageTypeId {
    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MessageTypeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Identity of one socket/connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(Uuid);

impl SocketId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Connection lifecycle.
///
/// `Connecting → Handshaking → Connected → Disconnected`; any state may jump
/// straight to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Transport connect in progress.
    #[default]
    Connecting,
    /// Greeting exchange in progress.
    Handshaking,
    /// Live application traffic.
    Connected,
    /// Closed locally or by the peer.
    Disconnected,
}

impl ConnectionState {
    /// Whether the connection can no longer carry traffic.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_codes_round_trip() {
        for node_type in NodeType::ALL {
            assert_eq!(NodeType::from_code(node_type.code()), Some(node_type));
        }
    }

    #[test]
    fn test_unknown_node_type_code() {
        assert_eq!(NodeType::from_code(8), None);
        assert_eq!(NodeType::from_code(0xFF), None);
    }

    #[test]
    fn test_node_type_display() {
        assert_eq!(NodeType::ServiceQueueWorker.to_string(), "service-queue-worker");
        assert_eq!(NodeType::default(), NodeType::Unspecified);
    }

    #[test]
    fn test_socket_ids_unique() {
        assert_ne!(SocketId::new(), SocketId::new());
    }

    #[test]
    fn test_message_type_id_serde_transparent() {
        let json = serde_json::to_string(&MessageTypeId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_connection_state_terminal() {
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }
}
