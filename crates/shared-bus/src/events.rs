//! # Bus Events
//!
//! Events are engine-specific enums; the bus only needs to know their topic
//! so observers can filter.

/// An event that can travel through the bus.
pub trait BusEvent: Clone + Send + Sync + 'static {
    /// Topic used by [`EventFilter`].
    fn topic(&self) -> EventTopic;
}

/// Event topics for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// Peer connected or disconnected.
    Connection,
    /// Application message received.
    Message,
    /// Engine-level lifecycle (bind, unbind, shutdown).
    Lifecycle,
    /// Matches everything.
    All,
}

/// Filter for subscribing to specific topics.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self { topics: Vec::new() }
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches<E: BusEvent>(&self, event: &E) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
