//! Shared message types and helpers for the integration suite.

use mq_02_serialization::{SerializationRegistry, TypedMessage};
use mq_03_pubsub::{ClientHandle, PublisherEvent};
use serde::{Deserialize, Serialize};
use shared_bus::Subscription;
use shared_types::{Endpoint, MessageTypeId, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Upper bound for any single wait in a scenario.
pub const WAIT: Duration = Duration::from_secs(2);

/// Free-text broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
}

impl Text {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl TypedMessage for Text {
    const MESSAGE_TYPE: MessageTypeId = MessageTypeId(1);
}

/// Numbered broadcast for ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequenced(pub u64);

impl TypedMessage for Sequenced {
    const MESSAGE_TYPE: MessageTypeId = MessageTypeId(2);
}

/// Request answered by [`Shout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whisper {
    pub body: String,
}

impl TypedMessage for Whisper {
    const MESSAGE_TYPE: MessageTypeId = MessageTypeId(10);
}

/// Upper-cased reply to a [`Whisper`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shout {
    pub body: String,
    pub served_by: String,
}

impl TypedMessage for Shout {
    const MESSAGE_TYPE: MessageTypeId = MessageTypeId(11);
}

/// Request type that no worker routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orphan;

impl TypedMessage for Orphan {
    const MESSAGE_TYPE: MessageTypeId = MessageTypeId(12);
}

/// Registry with every fixture type. `Text` uses JSON, the rest bincode.
pub fn registry() -> Arc<SerializationRegistry> {
    let registry = SerializationRegistry::new();
    let setup = registry
        .register_json::<Text>()
        .and_then(|()| registry.register_bincode::<Sequenced>())
        .and_then(|()| registry.register_bincode::<Whisper>())
        .and_then(|()| registry.register_bincode::<Shout>())
        .and_then(|()| registry.register_bincode::<Orphan>());
    if let Err(e) = setup {
        panic!("fixture registry: {e}");
    }
    Arc::new(registry)
}

/// A fresh bind target for `transport`: port 0 on loopback, or a unique
/// in-process name.
pub fn endpoint(transport: TransportKind, label: &str) -> Endpoint {
    match transport {
        TransportKind::Tcp => Endpoint::tcp("127.0.0.1", 0),
        TransportKind::InProc => Endpoint::in_proc(format!("{label}-{}", Uuid::new_v4())),
    }
}

/// Wait for the next `ClientConnected`, skipping other events.
pub async fn next_connected(events: &mut Subscription<PublisherEvent>) -> ClientHandle {
    loop {
        match events.recv_timeout(WAIT).await {
            Ok(PublisherEvent::ClientConnected(client)) => return client,
            Ok(_) => continue,
            Err(e) => panic!("no ClientConnected: {e}"),
        }
    }
}

/// Wait for the next `ClientDisconnected`, skipping other events.
pub async fn next_disconnected(events: &mut Subscription<PublisherEvent>) -> ClientHandle {
    loop {
        match events.recv_timeout(WAIT).await {
            Ok(PublisherEvent::ClientDisconnected(client)) => return client,
            Ok(_) => continue,
            Err(e) => panic!("no ClientDisconnected: {e}"),
        }
    }
}
