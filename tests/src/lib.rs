//! # Quantum-MQ Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── mq_benchmarks.rs   # Wire codec, registry, broadcast, request round trip
//! └── src/
//!     ├── fixtures.rs        # Shared message types and helpers
//!     └── integration/       # Cross-crate scenarios
//!         ├── pubsub.rs
//!         ├── reqrep.rs
//!         ├── handshake.rs
//!         └── service_queue.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p mq-tests
//!
//! # By area
//! cargo test -p mq-tests integration::pubsub::
//! cargo test -p mq-tests integration::reqrep::
//! cargo test -p mq-tests integration::service_queue::
//!
//! # Benchmarks
//! cargo bench -p mq-tests
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod fixtures;
pub mod integration;
