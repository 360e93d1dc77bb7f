//! # Server Core
//!
//! Listener and peer bookkeeping shared by [`Responder`](crate::Responder)
//! and [`ServiceQueue`](crate::ServiceQueue).
//!
//! Each verified connection gets its own event channel and one serving task,
//! so a slow connection never stalls its siblings. When the serving task
//! returns the peer is removed and `ClientDisconnected` fires once.

use crate::events::{PeerInfo, ServerEvent};
use futures::future::BoxFuture;
use mq_01_transport::{
    listen, AcceptLoop, Connection, ConnectionEvent, ExpectedRoles, Handshake, Socket,
    SocketConfig,
};
use parking_lot::{Mutex, RwLock};
use shared_bus::{EventPublisher, InMemoryEventBus};
use shared_types::{Endpoint, MqError, NodeType, SocketId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Serves one connection until it closes.
pub(crate) type ServeFn =
    Arc<dyn Fn(Connection, mpsc::Receiver<ConnectionEvent>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Peer {
    info: PeerInfo,
    connection: Connection,
}

pub(crate) struct ServerCore {
    role: NodeType,
    config: SocketConfig,
    /// Lock order: `listeners` before `peers`.
    listeners: Mutex<HashMap<Endpoint, AcceptLoop>>,
    peers: RwLock<HashMap<SocketId, Peer>>,
    events: InMemoryEventBus<ServerEvent>,
    shut_down: AtomicBool,
}

impl ServerCore {
    pub(crate) fn new(role: NodeType, config: SocketConfig) -> Arc<Self> {
        Arc::new(Self {
            role,
            config,
            listeners: Mutex::new(HashMap::new()),
            peers: RwLock::new(HashMap::new()),
            events: InMemoryEventBus::new(role.as_str()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub(crate) fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &InMemoryEventBus<ServerEvent> {
        &self.events
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Accept peers declaring one of `expected` on `endpoint`, serving each
    /// with `serve`.
    pub(crate) async fn bind(
        self: &Arc<Self>,
        endpoint: &Endpoint,
        expected: ExpectedRoles,
        serve: ServeFn,
    ) -> Result<Endpoint, MqError> {
        if self.is_shut_down() {
            return Err(MqError::Disconnected);
        }

        let listener = listen(endpoint, &self.config).await?;
        let bound = listener.local_endpoint().clone();
        let handshake = Handshake {
            local: self.role,
            expected,
            timeout: self.config.handshake_timeout,
        };

        let weak = Arc::downgrade(self);
        let arrived_on = bound.clone();
        let mut listeners = self.listeners.lock();
        let accept = AcceptLoop::spawn(listener, handshake, move |socket, remote| {
            if let Some(core) = weak.upgrade() {
                core.register(socket, remote, &arrived_on, &serve);
            }
        });
        listeners.insert(bound.clone(), accept);
        drop(listeners);

        info!(role = %self.role, endpoint = %bound, "Bound");
        self.events.publish(ServerEvent::Bound(bound.clone()));
        Ok(bound)
    }

    /// Stop accepting on `endpoint` and close its peers. Unknown endpoints
    /// are ignored.
    pub(crate) async fn unbind(&self, endpoint: &Endpoint) {
        let accept = self.listeners.lock().remove(endpoint);
        let Some(mut accept) = accept else {
            return;
        };
        accept.stop().await;

        let doomed: Vec<SocketId> = self
            .peers
            .read()
            .values()
            .filter(|peer| &peer.info.endpoint == endpoint)
            .map(|peer| peer.info.id)
            .collect();
        for id in doomed {
            self.remove(id);
        }
        info!(role = %self.role, %endpoint, "Unbound");
        self.events.publish(ServerEvent::Unbound(endpoint.clone()));
    }

    pub(crate) async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let endpoints: Vec<Endpoint> = self.listeners.lock().keys().cloned().collect();
        for endpoint in endpoints {
            self.unbind(&endpoint).await;
        }
        let remaining: Vec<SocketId> = self.peers.read().keys().copied().collect();
        for id in remaining {
            self.remove(id);
        }
        debug!(role = %self.role, "Shut down");
    }

    pub(crate) fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().values().map(|peer| peer.info.clone()).collect()
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub(crate) fn endpoints(&self) -> Vec<Endpoint> {
        self.listeners.lock().keys().cloned().collect()
    }

    fn register(self: &Arc<Self>, socket: Socket, remote: NodeType, endpoint: &Endpoint, serve: &ServeFn) {
        let listeners = self.listeners.lock();
        if self.is_shut_down() || !listeners.contains_key(endpoint) {
            debug!(socket_id = %socket.id(), "Endpoint unbound during greeting, dropping");
            return;
        }

        let (events, receiver) = mpsc::channel(self.config.inbound_capacity.max(1));
        let connection = Connection::spawn(socket, self.role, remote, &self.config, events);
        let info = PeerInfo {
            id: connection.id(),
            peer: connection.info().peer.clone(),
            remote_role: remote,
            endpoint: endpoint.clone(),
        };
        info!(socket_id = %info.id, peer = %info.peer, remote = %remote, %endpoint, "Peer connected");
        // Announced before `remove` can see the peer.
        self.events.publish(ServerEvent::ClientConnected(info.clone()));
        self.peers.write().insert(
            info.id,
            Peer {
                info: info.clone(),
                connection: connection.clone(),
            },
        );
        drop(listeners);

        let serving = serve(connection, receiver);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            serving.await;
            if let Some(core) = weak.upgrade() {
                core.remove(info.id);
            }
        });
    }

    /// Close and forget a peer; fires `ClientDisconnected` only if present.
    pub(crate) fn remove(&self, id: SocketId) {
        let removed = self.peers.write().remove(&id);
        if let Some(peer) = removed {
            peer.connection.close();
            info!(socket_id = %id, "Peer disconnected");
            self.events.publish(ServerEvent::ClientDisconnected(peer.info));
        }
    }
}

impl Drop for ServerCore {
    fn drop(&mut self) {
        for peer in self.peers.get_mut().values() {
            peer.connection.close();
        }
    }
}
