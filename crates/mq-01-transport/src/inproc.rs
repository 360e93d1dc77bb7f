//! # In-Process Transport
//!
//! Named endpoints inside one process. A connection is a pair of bounded
//! channels carrying frame batches by value; payload `Bytes` are shared, never
//! copied or encoded.
//!
//! The name registry is process-wide. A name stays reserved until its
//! listener is dropped.

use crate::config::SocketConfig;
use crate::listener::Listener;
use crate::socket::{FrameRead, FrameWrite, Socket, SocketInfo};
use async_trait::async_trait;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use shared_types::{Endpoint, Frame, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

struct Registration {
    listener_id: u64,
    backlog: mpsc::Sender<Socket>,
}

lazy_static! {
    static ref BOUND_NAMES: Mutex<HashMap<String, Registration>> = Mutex::new(HashMap::new());
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn endpoint_name(endpoint: &Endpoint) -> Result<&str, TransportError> {
    endpoint
        .name()
        .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))
}

/// Receiving end of an in-process connection.
pub struct ChannelReader {
    incoming: mpsc::Receiver<Vec<Frame>>,
    pending: VecDeque<Frame>,
}

#[async_trait]
impl FrameRead for ChannelReader {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }
            match self.incoming.recv().await {
                Some(batch) => self.pending.extend(batch),
                None => return Err(TransportError::Disconnected),
            }
        }
    }
}

/// Sending end of an in-process connection.
pub struct ChannelWriter {
    outgoing: Option<mpsc::Sender<Vec<Frame>>>,
}

#[async_trait]
impl FrameWrite for ChannelWriter {
    async fn send_batch(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::Disconnected)?;
        outgoing
            .send(frames)
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn close(&mut self) {
        self.outgoing = None;
    }
}

fn half(
    info: SocketInfo,
    incoming: mpsc::Receiver<Vec<Frame>>,
    outgoing: mpsc::Sender<Vec<Frame>>,
) -> Socket {
    Socket::new(
        info,
        Box::new(ChannelReader {
            incoming,
            pending: VecDeque::new(),
        }),
        Box::new(ChannelWriter {
            outgoing: Some(outgoing),
        }),
    )
}

/// Connect to a bound name.
///
/// # Errors
///
/// `ConnectFailed` when nothing is bound under the name, `Timeout` when the
/// listener's backlog stays full past `config.connect_timeout`.
pub async fn connect(endpoint: &Endpoint, config: &SocketConfig) -> Result<Socket, TransportError> {
    let name = endpoint_name(endpoint)?;
    let backlog = BOUND_NAMES
        .lock()
        .get(name)
        .map(|registration| registration.backlog.clone())
        .ok_or_else(|| TransportError::ConnectFailed {
            endpoint: endpoint.clone(),
            reason: "no listener bound".to_string(),
        })?;

    let capacity = config.inbound_capacity.max(1);
    let (client_tx, server_rx) = mpsc::channel(capacity);
    let (server_tx, client_rx) = mpsc::channel(capacity);

    let mut client_info = SocketInfo::new(endpoint.clone(), String::new(), true);
    let server_info = SocketInfo::new(endpoint.clone(), client_info.id.to_string(), false);
    client_info.peer = server_info.id.to_string();

    let server = half(server_info, server_rx, server_tx);
    match timeout(config.connect_timeout, backlog.send(server)).await {
        Ok(Ok(())) => {
            debug!(%endpoint, "InProc connected");
            Ok(half(client_info, client_rx, client_tx))
        }
        Ok(Err(_)) => Err(TransportError::ConnectFailed {
            endpoint: endpoint.clone(),
            reason: "listener closed".to_string(),
        }),
        Err(_) => Err(TransportError::Timeout),
    }
}

/// Listener for one in-process name.
pub struct InProcListener {
    listener_id: u64,
    name: String,
    local: Endpoint,
    backlog: mpsc::Receiver<Socket>,
}

/// Reserve a name.
///
/// # Errors
///
/// `AddressInUse` if the name is already bound.
pub fn bind(endpoint: &Endpoint, config: &SocketConfig) -> Result<InProcListener, TransportError> {
    let name = endpoint_name(endpoint)?;
    let mut bound = BOUND_NAMES.lock();
    if bound.contains_key(name) {
        return Err(TransportError::AddressInUse(endpoint.clone()));
    }

    let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
    let listener_id = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
    bound.insert(
        name.to_string(),
        Registration {
            listener_id,
            backlog: tx,
        },
    );
    info!(%endpoint, "InProc listener bound");

    Ok(InProcListener {
        listener_id,
        name: name.to_string(),
        local: endpoint.clone(),
        backlog: rx,
    })
}

#[async_trait]
impl Listener for InProcListener {
    async fn accept(&mut self) -> Result<Socket, TransportError> {
        self.backlog.recv().await.ok_or(TransportError::Disconnected)
    }

    fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }
}

impl Drop for InProcListener {
    fn drop(&mut self) {
        let mut bound = BOUND_NAMES.lock();
        if bound
            .get(&self.name)
            .is_some_and(|registration| registration.listener_id == self.listener_id)
        {
            bound.remove(&self.name);
            debug!(name = %self.name, "InProc name released");
        }
    }
}
