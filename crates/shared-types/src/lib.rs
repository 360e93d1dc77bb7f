//! # Shared Types Crate
//!
//! This crate contains the value types that flow between every Quantum-MQ
//! crate: endpoint descriptors, node roles, frames and the error taxonomy.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Immutable values**: `Endpoint`, `NodeType` and `Frame` are plain values,
//!   freely cloned and shared read-only across tasks.
//! - **Closed role set**: node roles are a fixed enum checked at handshake time,
//!   never open-ended subtyping.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod endpoint;
pub mod entities;
pub mod errors;
pub mod frame;

pub use endpoint::{Endpoint, TransportKind};
pub use entities::*;
pub use errors::*;
pub use frame::{ErrorCode, Frame, FrameKind};

/// Current greeting protocol version.
pub const PROTOCOL_VERSION: u8 = 1;
