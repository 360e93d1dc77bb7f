//! # mq-04 Request/Response
//!
//! Correlated request/response and worker-pool dispatch.
//!
//! ```text
//! Requester ──Request(id=7)──▶ Responder ──WorkerDefinition──▶ handler
//!     ▲                            │
//!     └──────Response(id=7)────────┘
//! ```
//!
//! - [`Requester`]: many requests in flight per connection, matched by
//!   correlation identifier.
//! - [`Responder`]: answers each connection's requests in order through a
//!   [`WorkerDefinition`].
//! - [`ServiceQueue`]: one accept point feeding a bounded job queue drained
//!   by in-process workers and remote [`ServiceQueueWorker`]s.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod events;
mod pending;
pub mod requester;
pub mod responder;
mod server;
pub mod service_queue;
pub mod service_worker;
pub mod worker;

pub use config::ServiceQueueConfig;
pub use events::{PeerInfo, ServerEvent};
pub use requester::Requester;
pub use responder::Responder;
pub use service_queue::ServiceQueue;
pub use service_worker::ServiceQueueWorker;
pub use worker::{RequestHandler, WorkerDefinition};
