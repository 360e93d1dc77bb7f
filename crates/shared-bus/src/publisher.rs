//! # Event Publisher
//!
//! Publishing side of the bus. Each engine owns one bus and publishes from
//! its accept loop and connection tasks, so `publish` is synchronous and never
//! waits on an observer.

use crate::events::{BusEvent, EventFilter, EventTopic};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_EVENT_CAPACITY;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Publishing half of an event bus.
pub trait EventPublisher<E: BusEvent>: Send + Sync {
    /// Deliver `event` to current observers. Returns how many received it.
    fn publish(&self, event: E) -> usize;

    /// Events published on `topic` so far, observed or not.
    /// [`EventTopic::All`] sums every topic.
    fn published(&self, topic: EventTopic) -> u64;
}

#[derive(Debug, Default)]
struct TopicCounts {
    connection: AtomicU64,
    message: AtomicU64,
    lifecycle: AtomicU64,
}

impl TopicCounts {
    fn slot(&self, topic: EventTopic) -> Option<&AtomicU64> {
        match topic {
            EventTopic::Connection => Some(&self.connection),
            EventTopic::Message => Some(&self.message),
            EventTopic::Lifecycle => Some(&self.lifecycle),
            EventTopic::All => None,
        }
    }

    fn get(&self, topic: EventTopic) -> u64 {
        match self.slot(topic) {
            Some(count) => count.load(Ordering::Relaxed),
            None => [EventTopic::Connection, EventTopic::Message, EventTopic::Lifecycle]
                .into_iter()
                .map(|topic| self.get(topic))
                .sum(),
        }
    }
}

/// Event bus backed by `tokio::sync::broadcast`.
///
/// Observers that fall more than the channel capacity behind skip the oldest
/// events and keep going.
pub struct InMemoryEventBus<E: BusEvent> {
    sender: broadcast::Sender<E>,
    /// Owning engine, for logs.
    label: &'static str,
    counts: TopicCounts,
}

impl<E: BusEvent> InMemoryEventBus<E> {
    /// Bus for the engine named `label`, with the default capacity.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self::with_capacity(label, DEFAULT_EVENT_CAPACITY)
    }

    /// Bus buffering up to `capacity` events per observer.
    #[must_use]
    pub fn with_capacity(label: &'static str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            label,
            counts: TopicCounts::default(),
        }
    }

    /// Observe events matching `filter` from now on.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription<E> {
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Same as [`InMemoryEventBus::subscribe`], as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream<E> {
        EventStream::new(self.subscribe(filter))
    }

    /// Live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Owning engine name.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl<E: BusEvent> EventPublisher<E> for InMemoryEventBus<E> {
    fn publish(&self, event: E) -> usize {
        let topic = event.topic();
        if let Some(count) = self.counts.slot(topic) {
            count.fetch_add(1, Ordering::Relaxed);
        }

        // An error only means nobody is watching this engine.
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(bus = self.label, ?topic, receivers, "Event published");
        receivers
    }

    fn published(&self, topic: EventTopic) -> u64 {
        self.counts.get(topic)
    }
}
