//! # Subscriber
//!
//! Receives broadcasts from one publisher.
//!
//! Messages are delivered two ways at once: as `MessageReceived` events on
//! the bus, and through a bounded queue drained by [`Subscriber::receive`].
//!
//! The queue never drops. Once it is full the connection stops reading, so
//! the publisher's sends back up and eventually hit its `send_timeout`. A
//! subscriber that only watches events should keep calling `receive` or
//! accept that stall.

use crate::events::SubscriberEvent;
use mq_01_transport::{dial, Connection, ConnectionEvent, ExpectedRoles, SocketConfig};
use mq_02_serialization::{Message, SerializationRegistry};
use shared_bus::{EventFilter, EventPublisher, EventStream, InMemoryEventBus, Subscription};
use shared_types::{Endpoint, FrameKind, MqError, NodeType, SocketId, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

struct SubscriberShared {
    registry: Arc<SerializationRegistry>,
    events: InMemoryEventBus<SubscriberEvent>,
    disconnected: AtomicBool,
    announced: AtomicBool,
}

impl SubscriberShared {
    fn announce_disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        if !self.announced.swap(true, Ordering::SeqCst) {
            self.events.publish(SubscriberEvent::Disconnected);
        }
    }
}

/// Broadcast receiver connected to one publisher.
pub struct Subscriber {
    connection: Connection,
    endpoint: Endpoint,
    shared: Arc<SubscriberShared>,
    received: Mutex<mpsc::Receiver<Arc<dyn Message>>>,
}

impl Subscriber {
    /// Connect to a publisher and complete the greeting.
    ///
    /// Declares `Subscriber`; accepts `Publisher` plus
    /// `config.additional_remote_roles`.
    pub async fn connect(
        endpoint: &Endpoint,
        registry: Arc<SerializationRegistry>,
        config: SocketConfig,
    ) -> Result<Self, MqError> {
        let expected = ExpectedRoles::new(NodeType::Publisher)
            .with_additional(config.additional_remote_roles.iter().copied());
        let (socket, remote) = dial(endpoint, &config, NodeType::Subscriber, &expected).await?;

        let capacity = config.inbound_capacity.max(1);
        let (connection_tx, connection_rx) = mpsc::channel(capacity);
        let connection =
            Connection::spawn(socket, NodeType::Subscriber, remote, &config, connection_tx);

        let shared = Arc::new(SubscriberShared {
            registry,
            events: InMemoryEventBus::new("subscriber"),
            disconnected: AtomicBool::new(false),
            announced: AtomicBool::new(false),
        });
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        tokio::spawn(receive_loop(Arc::clone(&shared), connection_rx, queue_tx));

        info!(%endpoint, socket_id = %connection.id(), "Subscriber connected");
        Ok(Self {
            connection,
            endpoint: endpoint.clone(),
            shared,
            received: Mutex::new(queue_rx),
        })
    }

    /// Wait up to `timeout` for the next broadcast.
    ///
    /// # Errors
    ///
    /// `Timeout` if nothing arrives in time, `Disconnected` once the
    /// connection has ended and the queue is drained.
    pub async fn receive(&self, timeout: Duration) -> Result<Arc<dyn Message>, MqError> {
        let next = async { self.received.lock().await.recv().await };
        match tokio::time::timeout(timeout, next).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(MqError::Disconnected),
            Err(_) => Err(MqError::Timeout),
        }
    }

    /// Send a message upstream to the publisher.
    pub async fn send_message(&self, message: &dyn Message) -> Result<(), MqError> {
        if self.is_disconnected() {
            return Err(MqError::Disconnected);
        }
        let frame = self.shared.registry.message_frame(message)?;
        self.connection.send(frame).await.map_err(|e| match e {
            TransportError::Disconnected => MqError::Disconnected,
            other => MqError::Transport(other),
        })
    }

    /// Close the connection, waiting at most `timeout` for it to wind down.
    ///
    /// Idempotent. `Disconnected` fires once across all calls and connection
    /// loss.
    pub async fn disconnect(&self, timeout: Duration) {
        self.shared.disconnected.store(true, Ordering::SeqCst);
        self.connection.close();
        if tokio::time::timeout(timeout, self.connection.closed())
            .await
            .is_err()
        {
            warn!(endpoint = %self.endpoint, "Connection did not close in time");
        }
        self.shared.announce_disconnect();
    }

    /// Whether the subscriber was disconnected locally or lost its
    /// connection.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::SeqCst) || self.connection.is_closed()
    }

    /// Wait until the connection has closed, for whatever reason.
    pub async fn closed(&self) {
        self.connection.closed().await;
    }

    /// Publisher endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Local socket id.
    #[must_use]
    pub fn socket_id(&self) -> SocketId {
        self.connection.id()
    }

    /// Observe all subscriber events from now on.
    #[must_use]
    pub fn events(&self) -> Subscription<SubscriberEvent> {
        self.shared.events.subscribe(EventFilter::all())
    }

    /// Observe selected subscriber events as a stream.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream<SubscriberEvent> {
        self.shared.events.event_stream(filter)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.connection.close();
    }
}

async fn receive_loop(
    shared: Arc<SubscriberShared>,
    mut connection_events: mpsc::Receiver<ConnectionEvent>,
    queue: mpsc::Sender<Arc<dyn Message>>,
) {
    while let Some(event) = connection_events.recv().await {
        match event {
            ConnectionEvent::Frame { frame, .. } if frame.kind == FrameKind::Message => {
                match shared.registry.deserialize_frame(&frame) {
                    Ok(message) => {
                        shared
                            .events
                            .publish(SubscriberEvent::MessageReceived(Arc::clone(&message)));
                        if queue.send(message).await.is_err() {
                            trace!("Subscriber dropped, receive queue closed");
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping broadcast"),
                }
            }
            ConnectionEvent::Frame { frame, .. } => {
                debug!(kind = ?frame.kind, "Ignoring non-message frame");
            }
            ConnectionEvent::Closed { connection } => {
                info!(socket_id = %connection.id(), "Subscriber disconnected");
                shared.announce_disconnect();
                break;
            }
        }
    }
}
