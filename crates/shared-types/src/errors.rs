//! # Error Types
//!
//! Defines the error taxonomy shared by every layer. Lower layers return their
//! own enum; the messaging engines surface [`MqError`].

use crate::entities::{MessageTypeId, NodeType};
use crate::endpoint::Endpoint;
use thiserror::Error;

/// Errors from the socket/transport layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: Endpoint, reason: String },

    /// Endpoint address or in-process name already bound.
    #[error("Address already in use: {0}")]
    AddressInUse(Endpoint),

    /// Failed to open a listener.
    #[error("Failed to bind {endpoint}: {reason}")]
    BindFailed { endpoint: Endpoint, reason: String },

    /// Endpoint string could not be parsed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Peer closed or the connection was closed locally.
    #[error("Connection closed")]
    Disconnected,

    /// Deadline elapsed without a transport failure.
    #[error("Operation timed out")]
    Timeout,

    /// Frame exceeds the configured maximum.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame bytes could not be parsed.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::Disconnected,
            ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Why a greeting was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Peer declared a role outside the expected set.
    UnexpectedRole(NodeType),
    /// Peer declared an unknown role code.
    UnknownRole(u8),
    /// Greeting magic bytes did not match.
    BadMagic,
    /// Greeting version not supported.
    UnsupportedVersion(u8),
    /// Peer sent application traffic before greeting.
    ProtocolViolation,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedRole(role) => write!(f, "unexpected remote role {role}"),
            Self::UnknownRole(code) => write!(f, "unknown role code {code}"),
            Self::BadMagic => write!(f, "bad greeting magic"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported greeting version {v}"),
            Self::ProtocolViolation => write!(f, "application frame before greeting"),
        }
    }
}

/// Errors from the greeting negotiation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GreetingError {
    /// Deadline elapsed before both send and receive completed.
    #[error("Greeting timed out")]
    Timeout,

    /// Peer's greeting failed verification.
    #[error("Greeting rejected: {0}")]
    Rejected(RejectReason),

    /// Transport failed during the exchange.
    #[error("Greeting transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from the serialization registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    /// Second registration for the same type.
    #[error("Duplicate registration for message type {0}")]
    DuplicateRegistration(MessageTypeId),

    /// No serializer for the message's type.
    #[error("No serializer registered for message type {0}")]
    NoSerializerRegistered(MessageTypeId),

    /// No deserializer for the frame's type.
    #[error("No deserializer registered for message type {0}")]
    NoDeserializerRegistered(MessageTypeId),

    /// Payload bytes are malformed for the type.
    #[error("Cannot deserialize message type {message_type}: {reason}")]
    DeserializationError {
        message_type: MessageTypeId,
        reason: String,
    },

    /// Serializer rejected the message.
    #[error("Cannot serialize message type {message_type}: {reason}")]
    SerializationFailed {
        message_type: MessageTypeId,
        reason: String,
    },
}

/// Errors surfaced by the messaging engines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MqError {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Handshake failure.
    #[error(transparent)]
    Greeting(#[from] GreetingError),

    /// Message type not set up or corrupt payload.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Connection lost during steady-state use.
    #[error("Disconnected")]
    Disconnected,

    /// Blocking operation's deadline elapsed.
    #[error("Timed out")]
    Timeout,

    /// Remote side reported a failure for a request.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Service queue is at capacity.
    #[error("Service queue full")]
    QueueFull,
}
