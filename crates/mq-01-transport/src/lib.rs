//! # mq-01 Transport
//!
//! Connection layer shared by every messaging engine.
//!
//! ## Layers
//!
//! ```text
//! Endpoint ──connect/listen──▶ Socket ──greeting──▶ Connection
//!    │                           │                      │
//!    │  tcp:// (length-prefixed) │  negotiate()         │  reader task ─▶ ConnectionEvent
//!    │  inproc:// (channels)     │  expected roles      │  writer task ◀─ send_batch()
//! ```
//!
//! - [`listen`] binds a [`Listener`]; [`AcceptLoop`] runs greetings for
//!   inbound sockets concurrently.
//! - [`dial`] connects and greets in one step.
//! - A [`Connection`] owns one reader task and one writer task; engines
//!   consume its [`ConnectionEvent`]s.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod greeting;
pub mod inproc;
pub mod listener;
pub mod signal;
pub mod socket;
pub mod tcp;
pub mod wire;

pub use acceptor::{AcceptLoop, Handshake};
pub use config::SocketConfig;
pub use connection::{Connection, ConnectionEvent};
pub use greeting::{
    negotiate, verify_greeting, ExpectedRoles, GreetingMessage, GreetingResult, GreetingState,
    Negotiator,
};
pub use listener::{connect, listen, Listener};
pub use signal::{Shutdown, ShutdownListener};
pub use socket::{FrameRead, FrameWrite, Socket, SocketInfo};

use shared_types::{Endpoint, MqError, NodeType};

/// Connect to `endpoint` and run the greeting.
///
/// Returns the verified socket and the peer's declared role.
pub async fn dial(
    endpoint: &Endpoint,
    config: &SocketConfig,
    local: NodeType,
    expected: &ExpectedRoles,
) -> Result<(Socket, NodeType), MqError> {
    let socket = connect(endpoint, config).await?;
    let verified = negotiate(socket, local, expected, config.handshake_timeout).await?;
    Ok(verified)
}
