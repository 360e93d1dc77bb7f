//! # Shared Bus
//!
//! Notification channel between the messaging engines and application code.
//!
//! ```text
//!  accept loop ─┐                               ┌─▶ Subscription::recv()
//!  reader task ─┼─ publish(ClientConnected) ─▶ bus ─┼─▶ EventStream (filtered)
//!  broadcast   ─┘      (never waits)            └─▶ ... one per observer
//! ```
//!
//! Each engine (Publisher, Subscriber, Responder, ServiceQueue) owns one
//! [`InMemoryEventBus`] carrying its own event enum. Observers register with
//! an [`EventFilter`] on [`EventTopic`]s and only see events published after
//! they subscribed. A slow observer lags on its own; it cannot stall the
//! engine that publishes.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{BusEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Events buffered per observer before it starts skipping.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
