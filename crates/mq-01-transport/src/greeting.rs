//! # Greeting Negotiation
//!
//! Role exchange run on every socket right after connect/accept.
//!
//! ## Algorithm
//!
//! 1. Both sides send `[b'M', b'Q', version, node_type]` and read the peer's
//!    greeting concurrently, under one shared deadline
//! 2. Filter 1: Kind - the first frame must be a greeting
//! 3. Filter 2: Magic and version
//! 4. Filter 3: Role - the declared role must be in the expected set
//!
//! Any failure closes the socket before returning.

use crate::socket::Socket;
use bytes::Bytes;
use mq_telemetry::metrics::HANDSHAKES;
use shared_types::{
    Frame, FrameKind, GreetingError, NodeType, RejectReason, TransportError, PROTOCOL_VERSION,
};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Greeting payload magic.
pub const GREETING_MAGIC: [u8; 2] = *b"MQ";

/// Greeting payload size.
pub const GREETING_SIZE: usize = 4;

// =============================================================================
// GREETING DATA
// =============================================================================

/// Role declaration exchanged once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreetingMessage {
    /// Declared role
    pub node_type: NodeType,
}

impl GreetingMessage {
    /// Declare `node_type`.
    #[must_use]
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type }
    }

    /// Fixed-size payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[
            GREETING_MAGIC[0],
            GREETING_MAGIC[1],
            PROTOCOL_VERSION,
            self.node_type.code(),
        ])
    }

    /// Greeting frame carrying this declaration.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame::greeting(self.encode())
    }

    /// Parse a greeting payload.
    pub fn decode(payload: &[u8]) -> Result<Self, RejectReason> {
        if payload.len() != GREETING_SIZE || payload[..2] != GREETING_MAGIC {
            return Err(RejectReason::BadMagic);
        }
        if payload[2] != PROTOCOL_VERSION {
            return Err(RejectReason::UnsupportedVersion(payload[2]));
        }
        NodeType::from_code(payload[3])
            .map(Self::new)
            .ok_or(RejectReason::UnknownRole(payload[3]))
    }
}

/// Roles accepted from the peer: one mandatory plus optional extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedRoles {
    primary: NodeType,
    additional: Vec<NodeType>,
}

impl ExpectedRoles {
    /// Accept only `primary`.
    #[must_use]
    pub fn new(primary: NodeType) -> Self {
        Self {
            primary,
            additional: Vec::new(),
        }
    }

    /// Also accept `roles`.
    #[must_use]
    pub fn with_additional(mut self, roles: impl IntoIterator<Item = NodeType>) -> Self {
        for role in roles {
            if role != self.primary && !self.additional.contains(&role) {
                self.additional.push(role);
            }
        }
        self
    }

    /// Mandatory role.
    #[must_use]
    pub fn primary(&self) -> NodeType {
        self.primary
    }

    /// Whether `role` is acceptable.
    #[must_use]
    pub fn contains(&self, role: NodeType) -> bool {
        role == self.primary || self.additional.contains(&role)
    }
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Outcome of checking the peer's first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingResult {
    /// Peer declared an expected role
    Accept(NodeType),
    /// Peer must be disconnected
    Reject(RejectReason),
}

/// Check the peer's first frame against the expected roles.
#[must_use]
pub fn verify_greeting(frame: &Frame, expected: &ExpectedRoles) -> GreetingResult {
    // Filter 1: Kind
    if frame.kind != FrameKind::Greeting {
        return GreetingResult::Reject(RejectReason::ProtocolViolation);
    }

    // Filter 2: Magic and version
    let greeting = match GreetingMessage::decode(&frame.payload) {
        Ok(greeting) => greeting,
        Err(reason) => return GreetingResult::Reject(reason),
    };

    // Filter 3: Role
    if expected.contains(greeting.node_type) {
        GreetingResult::Accept(greeting.node_type)
    } else {
        GreetingResult::Reject(RejectReason::UnexpectedRole(greeting.node_type))
    }
}

// =============================================================================
// NEGOTIATION
// =============================================================================

/// Negotiation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GreetingState {
    /// Nothing sent yet
    #[default]
    Start,
    /// Send and receive in flight
    Exchanging,
    /// Peer role accepted
    Verified(NodeType),
    /// Peer role or greeting refused
    Rejected(RejectReason),
    /// Deadline elapsed
    TimedOut,
    /// Transport failed mid-exchange
    Failed,
}

impl GreetingState {
    /// Whether negotiation has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Start | Self::Exchanging)
    }
}

/// Runs the greeting on one socket.
#[derive(Debug, Clone)]
pub struct Negotiator {
    local: NodeType,
    expected: ExpectedRoles,
    deadline: Duration,
    state: GreetingState,
}

impl Negotiator {
    /// Declare `local`, accept `expected`, give up after `deadline`.
    #[must_use]
    pub fn new(local: NodeType, expected: ExpectedRoles, deadline: Duration) -> Self {
        Self {
            local,
            expected,
            deadline,
            state: GreetingState::Start,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GreetingState {
        self.state
    }

    /// Exchange greetings on `socket`.
    ///
    /// On success the socket is returned with the verified remote role. On
    /// failure the socket has been closed.
    pub async fn run(&mut self, mut socket: Socket) -> Result<(Socket, NodeType), GreetingError> {
        self.state = GreetingState::Exchanging;
        let outgoing = GreetingMessage::new(self.local).to_frame();

        let exchange = async {
            let (reader, writer) = socket.halves_mut();
            let ((), incoming) = tokio::try_join!(writer.send_batch(vec![outgoing]), reader.recv())?;
            Ok::<Frame, TransportError>(incoming)
        };

        let outcome = timeout(self.deadline, exchange).await;
        let result = match outcome {
            Ok(Ok(frame)) => match verify_greeting(&frame, &self.expected) {
                GreetingResult::Accept(role) => {
                    self.state = GreetingState::Verified(role);
                    HANDSHAKES.with_label_values(&["verified"]).inc();
                    debug!(socket_id = %socket.id(), local = %self.local, remote = %role, "Greeting verified");
                    return Ok((socket, role));
                }
                GreetingResult::Reject(reason) => {
                    self.state = GreetingState::Rejected(reason);
                    HANDSHAKES.with_label_values(&["rejected"]).inc();
                    GreetingError::Rejected(reason)
                }
            },
            Ok(Err(e)) => {
                self.state = GreetingState::Failed;
                HANDSHAKES.with_label_values(&["transport_error"]).inc();
                GreetingError::Transport(e)
            }
            Err(_) => {
                self.state = GreetingState::TimedOut;
                HANDSHAKES.with_label_values(&["timeout"]).inc();
                GreetingError::Timeout
            }
        };

        warn!(
            socket_id = %socket.id(),
            peer = %socket.info().peer,
            local = %self.local,
            error = %result,
            "Greeting failed"
        );
        socket.close().await;
        Err(result)
    }
}

/// Exchange greetings on `socket` with a one-off [`Negotiator`].
pub async fn negotiate(
    socket: Socket,
    local: NodeType,
    expected: &ExpectedRoles,
    deadline: Duration,
) -> Result<(Socket, NodeType), GreetingError> {
    Negotiator::new(local, expected.clone(), deadline)
        .run(socket)
        .await
}
