//! # Publisher
//!
//! Broadcasts messages to every connected subscriber.
//!
//! ## Fan-out
//!
//! 1. Serialize once; frames share the payload buffer
//! 2. Snapshot the active set under the read lock, then release it
//! 3. Hand the frames to every connection's writer concurrently
//! 4. A failed connection is closed and removed; the rest still receive
//!
//! Each removal from the active set fires exactly one `ClientDisconnected`.

use crate::events::{ClientHandle, PublisherEvent};
use futures::future::join_all;
use mq_01_transport::{
    listen, AcceptLoop, Connection, ConnectionEvent, ExpectedRoles, Handshake, Socket,
    SocketConfig,
};
use mq_02_serialization::{Message, SerializationRegistry};
use mq_telemetry::metrics::BROADCAST_DELIVERIES;
use parking_lot::{Mutex, RwLock};
use shared_bus::{EventFilter, EventPublisher, EventStream, InMemoryEventBus, Subscription};
use shared_types::{Endpoint, Frame, FrameKind, MqError, NodeType, SocketId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct PublisherInner {
    config: SocketConfig,
    registry: Arc<SerializationRegistry>,
    /// Active subscribers. Lock order: `listeners` before `clients`.
    clients: RwLock<HashMap<SocketId, ClientHandle>>,
    listeners: Mutex<HashMap<Endpoint, AcceptLoop>>,
    events: InMemoryEventBus<PublisherEvent>,
    connection_events: mpsc::Sender<ConnectionEvent>,
    shut_down: AtomicBool,
}

/// Broadcast engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl Publisher {
    /// Create a publisher using `registry` for message payloads.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(registry: Arc<SerializationRegistry>, config: SocketConfig) -> Self {
        let (connection_events, receiver) = mpsc::channel(config.inbound_capacity.max(1));
        let inner = Arc::new(PublisherInner {
            config,
            registry,
            clients: RwLock::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            events: InMemoryEventBus::new("publisher"),
            connection_events,
            shut_down: AtomicBool::new(false),
        });
        tokio::spawn(dispatch(Arc::downgrade(&inner), receiver));
        Self { inner }
    }

    /// Start accepting subscribers on `endpoint`.
    ///
    /// Returns the endpoint actually bound; pass it to [`Publisher::unbind`].
    pub async fn bind(&self, endpoint: &Endpoint) -> Result<Endpoint, MqError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(MqError::Disconnected);
        }

        let listener = listen(endpoint, &self.inner.config).await?;
        let bound = listener.local_endpoint().clone();
        let handshake = Handshake {
            local: NodeType::Publisher,
            expected: ExpectedRoles::new(NodeType::Subscriber)
                .with_additional(self.inner.config.additional_remote_roles.iter().copied()),
            timeout: self.inner.config.handshake_timeout,
        };

        let weak = Arc::downgrade(&self.inner);
        let arrived_on = bound.clone();
        let mut listeners = self.inner.listeners.lock();
        let accept = AcceptLoop::spawn(listener, handshake, move |socket, remote| {
            if let Some(inner) = weak.upgrade() {
                inner.register(socket, remote, &arrived_on);
            }
        });
        listeners.insert(bound.clone(), accept);
        drop(listeners);

        info!(endpoint = %bound, "Publisher bound");
        Ok(bound)
    }

    /// Stop accepting on `endpoint` and close every client that arrived
    /// through it. Unknown endpoints are ignored.
    pub async fn unbind(&self, endpoint: &Endpoint) {
        let accept = self.inner.listeners.lock().remove(endpoint);
        let Some(mut accept) = accept else {
            return;
        };
        accept.stop().await;

        let doomed: Vec<SocketId> = self
            .inner
            .clients
            .read()
            .values()
            .filter(|client| client.endpoint() == endpoint)
            .map(ClientHandle::id)
            .collect();
        for id in doomed {
            self.inner.remove(id);
        }
        info!(%endpoint, "Publisher unbound");
    }

    /// Unbind everything and close all clients. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let endpoints: Vec<Endpoint> = self.inner.listeners.lock().keys().cloned().collect();
        for endpoint in endpoints {
            self.unbind(&endpoint).await;
        }
        let remaining: Vec<SocketId> = self.inner.clients.read().keys().copied().collect();
        for id in remaining {
            self.inner.remove(id);
        }
        debug!("Publisher shut down");
    }

    /// Send `message` to every connected subscriber.
    ///
    /// Returns how many subscribers accepted it.
    pub async fn broadcast(&self, message: &dyn Message) -> Result<usize, MqError> {
        let frame = self.inner.registry.message_frame(message)?;
        Ok(self.fan_out(vec![frame]).await)
    }

    /// Send several messages to every subscriber, one transport write per
    /// subscriber.
    pub async fn broadcast_batch(&self, messages: &[Arc<dyn Message>]) -> Result<usize, MqError> {
        let frames = self.inner.registry.serialize_batch(messages)?;
        if frames.is_empty() {
            return Ok(0);
        }
        Ok(self.fan_out(frames).await)
    }

    /// Send `message` to one subscriber.
    pub async fn send_to(&self, client: &ClientHandle, message: &dyn Message) -> Result<(), MqError> {
        if !self.inner.clients.read().contains_key(&client.id()) {
            return Err(MqError::Disconnected);
        }
        let frame = self.inner.registry.message_frame(message)?;
        if let Err(e) = client.connection().send(frame).await {
            warn!(socket_id = %client.id(), error = %e, "Send to subscriber failed");
            self.inner.remove(client.id());
            return Err(MqError::Disconnected);
        }
        Ok(())
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Snapshot of connected subscribers.
    #[must_use]
    pub fn subscribers(&self) -> Vec<ClientHandle> {
        self.inner.clients.read().values().cloned().collect()
    }

    /// Endpoints currently bound.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.listeners.lock().keys().cloned().collect()
    }

    /// Observe all publisher events from now on.
    #[must_use]
    pub fn events(&self) -> Subscription<PublisherEvent> {
        self.inner.events.subscribe(EventFilter::all())
    }

    /// Observe publisher events matching `filter` from now on.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription<PublisherEvent> {
        self.inner.events.subscribe(filter)
    }

    /// Observe selected publisher events as a stream.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream<PublisherEvent> {
        self.inner.events.event_stream(filter)
    }

    async fn fan_out(&self, frames: Vec<Frame>) -> usize {
        let targets: Vec<ClientHandle> = self.inner.clients.read().values().cloned().collect();

        let sends = targets.iter().map(|client| {
            let frames = frames.clone();
            async move { client.connection().send_batch(frames).await }
        });
        let results = join_all(sends).await;

        let mut delivered = 0;
        for (client, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    delivered += 1;
                    BROADCAST_DELIVERIES.with_label_values(&["delivered"]).inc();
                }
                Err(e) => {
                    BROADCAST_DELIVERIES.with_label_values(&["failed"]).inc();
                    warn!(socket_id = %client.id(), error = %e, "Broadcast to subscriber failed");
                    self.inner.remove(client.id());
                }
            }
        }
        debug!(delivered, targets = targets.len(), "Broadcast complete");
        delivered
    }
}

impl PublisherInner {
    fn register(&self, socket: Socket, remote: NodeType, endpoint: &Endpoint) {
        let listeners = self.listeners.lock();
        if self.shut_down.load(Ordering::SeqCst) || !listeners.contains_key(endpoint) {
            debug!(socket_id = %socket.id(), "Endpoint unbound during greeting, dropping");
            return;
        }

        let connection = Connection::spawn(
            socket,
            NodeType::Publisher,
            remote,
            &self.config,
            self.connection_events.clone(),
        );
        let client = ClientHandle::new(connection, endpoint.clone());
        info!(socket_id = %client.id(), peer = %client.peer(), %endpoint, "Subscriber connected");
        // Announced before `remove` can see the client, so its disconnect
        // always follows.
        self.events
            .publish(PublisherEvent::ClientConnected(client.clone()));
        self.clients.write().insert(client.id(), client.clone());
        drop(listeners);

        // The dispatch task may have handled `Closed` before the insert.
        if client.connection().is_closed() {
            self.remove(client.id());
        }
    }

    /// Remove a client; fires `ClientDisconnected` only if it was present.
    fn remove(&self, id: SocketId) {
        let removed = self.clients.write().remove(&id);
        if let Some(client) = removed {
            client.connection().close();
            info!(socket_id = %id, "Subscriber disconnected");
            self.events.publish(PublisherEvent::ClientDisconnected(client));
        }
    }

    fn on_frame(&self, connection: Connection, frame: Frame) {
        let Some(client) = self.clients.read().get(&connection.id()).cloned() else {
            return;
        };
        if frame.kind != FrameKind::Message {
            debug!(socket_id = %client.id(), kind = ?frame.kind, "Ignoring non-message frame");
            return;
        }
        match self.registry.deserialize_frame(&frame) {
            Ok(message) => {
                self.events
                    .publish(PublisherEvent::MessageReceived { client, message });
            }
            Err(e) => warn!(socket_id = %client.id(), error = %e, "Dropping upstream message"),
        }
    }
}

impl Drop for PublisherInner {
    fn drop(&mut self) {
        for client in self.clients.get_mut().values() {
            client.connection().close();
        }
    }
}

async fn dispatch(publisher: Weak<PublisherInner>, mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(engine) = publisher.upgrade() else {
            break;
        };
        match event {
            ConnectionEvent::Frame { connection, frame } => engine.on_frame(connection, frame),
            ConnectionEvent::Closed { connection } => engine.remove(connection.id()),
        }
    }
}
