//! Remote ServiceQueue worker.
//!
//! Connects to a queue's worker endpoint and answers the jobs it is handed
//! through its own [`WorkerDefinition`], one at a time.

use crate::responder::serve_requests;
use crate::worker::WorkerDefinition;
use mq_01_transport::{dial, Connection, ExpectedRoles, SocketConfig};
use mq_02_serialization::SerializationRegistry;
use shared_types::{Endpoint, MqError, NodeType, SocketId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Worker process attached to a [`ServiceQueue`](crate::ServiceQueue).
pub struct ServiceQueueWorker {
    connection: Connection,
    endpoint: Endpoint,
}

impl ServiceQueueWorker {
    /// Connect to `endpoint` (a queue's worker endpoint) and start serving.
    ///
    /// Declares `ServiceQueueWorker`; accepts `ServiceQueue` plus
    /// `config.additional_remote_roles`.
    pub async fn connect(
        endpoint: &Endpoint,
        registry: Arc<SerializationRegistry>,
        worker: WorkerDefinition,
        config: SocketConfig,
    ) -> Result<Self, MqError> {
        let expected = ExpectedRoles::new(NodeType::ServiceQueue)
            .with_additional(config.additional_remote_roles.iter().copied());
        let (socket, remote) =
            dial(endpoint, &config, NodeType::ServiceQueueWorker, &expected).await?;

        let (events, receiver) = mpsc::channel(config.inbound_capacity.max(1));
        let connection =
            Connection::spawn(socket, NodeType::ServiceQueueWorker, remote, &config, events);
        tokio::spawn(serve_requests(
            connection.clone(),
            receiver,
            Arc::new(worker),
            registry,
        ));

        info!(%endpoint, socket_id = %connection.id(), "Service queue worker attached");
        Ok(Self {
            connection,
            endpoint: endpoint.clone(),
        })
    }

    /// Detach from the queue, waiting at most `timeout`. Idempotent.
    pub async fn disconnect(&self, timeout: Duration) {
        self.connection.close();
        if tokio::time::timeout(timeout, self.connection.closed())
            .await
            .is_err()
        {
            warn!(endpoint = %self.endpoint, "Connection did not close in time");
        }
    }

    /// Whether the connection has ended.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.connection.is_closed()
    }

    /// Wait until the connection has closed.
    pub async fn closed(&self) {
        self.connection.closed().await;
    }

    /// Queue worker endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Local socket id.
    #[must_use]
    pub fn socket_id(&self) -> SocketId {
        self.connection.id()
    }
}

impl Drop for ServiceQueueWorker {
    fn drop(&mut self) {
        self.connection.close();
    }
}
