//! # mq-03 Publish/Subscribe
//!
//! Broadcast messaging.
//!
//! ```text
//!                     ┌──────────────┐
//!   broadcast() ────▶ │  Publisher   │──┬──▶ Subscriber A ──▶ receive() / MessageReceived
//!                     │  (bound)     │  ├──▶ Subscriber B
//!                     └──────────────┘  └──▶ Subscriber C
//! ```
//!
//! - Delivery is FIFO per subscriber; there is no replay for late joiners.
//! - A subscriber that fails a write is dropped without affecting the rest.
//! - Connection changes and upstream messages are reported as
//!   [`PublisherEvent`]s and [`SubscriberEvent`]s on the shared event bus.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ClientHandle, PublisherEvent, SubscriberEvent};
pub use publisher::Publisher;
pub use subscriber::Subscriber;
