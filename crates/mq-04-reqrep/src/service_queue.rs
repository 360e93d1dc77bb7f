//! # Service Queue
//!
//! One accept point, many workers.
//!
//! ```text
//! Requester ─┐                        ┌─▶ local worker 0 ─┐
//! Requester ─┼─▶ bounded job queue ───┼─▶ local worker 1 ─┼─▶ reply on the
//! Requester ─┘    (enqueue_timeout)   └─▶ remote worker  ─┘   client's connection
//! ```
//!
//! - Idle workers wait on the queue; the first to wait takes the next job, so
//!   busy workers are never handed more work.
//! - Each job is taken by exactly one worker.
//! - A request that cannot enter the full queue within `enqueue_timeout` is
//!   answered with an `Error` frame, never dropped.
//! - A remote worker that disconnects with a job in hand, or sits on it past
//!   `job_timeout`, fails that job with an `Error` frame and is dropped.

use crate::config::ServiceQueueConfig;
use crate::events::{PeerInfo, ServerEvent};
use crate::server::{ServeFn, ServerCore};
use crate::worker::WorkerDefinition;
use futures::FutureExt;
use mq_01_transport::{
    Connection, ConnectionEvent, ExpectedRoles, Shutdown, ShutdownListener, SocketConfig,
};
use mq_02_serialization::SerializationRegistry;
use mq_telemetry::metrics::{SERVICE_QUEUE_DEPTH, SERVICE_QUEUE_REJECTIONS};
use shared_bus::{EventFilter, EventStream, Subscription};
use shared_types::{Endpoint, ErrorCode, Frame, FrameKind, MqError, NodeType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

const QUEUE_FULL: &str = "service queue full";
const QUEUE_CLOSED: &str = "service queue shut down";
const WORKER_LOST: &str = "worker disconnected";
const WORKER_STALLED: &str = "worker timed out";

/// A request waiting for a worker.
struct Job {
    request: Frame,
    client: Connection,
}

impl Job {
    async fn reply(&self, frame: Frame) {
        if let Err(e) = self.client.send(frame).await {
            debug!(socket_id = %self.client.id(), error = %e, "Client gone before reply");
        }
    }

    async fn reject(&self, code: ErrorCode, reason: &str) {
        let frame = Frame::error_with_code(self.request.correlation_id, code, reason);
        self.reply(frame).await;
    }
}

type JobPool = Arc<Mutex<mpsc::Receiver<Job>>>;

async fn next_job(pool: &JobPool) -> Option<Job> {
    let job = pool.lock().await.recv().await;
    if job.is_some() {
        SERVICE_QUEUE_DEPTH.dec();
    }
    job
}

/// Worker-pool request server.
pub struct ServiceQueue {
    core: Arc<ServerCore>,
    registry: Arc<SerializationRegistry>,
    config: ServiceQueueConfig,
    jobs: mpsc::Sender<Job>,
    pool: JobPool,
    stop: Shutdown,
}

impl ServiceQueue {
    /// Create the queue and start `config.workers` in-process workers, each
    /// serving through `worker`.
    #[must_use]
    pub fn new(
        registry: Arc<SerializationRegistry>,
        worker: WorkerDefinition,
        socket_config: SocketConfig,
        config: ServiceQueueConfig,
    ) -> Self {
        let (jobs, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let pool: JobPool = Arc::new(Mutex::new(receiver));
        let stop = Shutdown::new();
        let worker = Arc::new(worker);

        for index in 0..config.workers {
            tokio::spawn(local_worker(
                index,
                Arc::clone(&pool),
                Arc::clone(&worker),
                Arc::clone(&registry),
                stop.listener(),
            ));
        }
        info!(
            workers = config.workers,
            capacity = config.queue_capacity,
            "Service queue started"
        );

        Self {
            core: ServerCore::new(NodeType::ServiceQueue, socket_config),
            registry,
            config,
            jobs,
            pool,
            stop,
        }
    }

    /// Accept requesters on `endpoint`.
    ///
    /// Accepts `Requester` plus `additional_remote_roles`. Returns the
    /// endpoint actually bound.
    pub async fn bind(&self, endpoint: &Endpoint) -> Result<Endpoint, MqError> {
        let expected = ExpectedRoles::new(NodeType::Requester)
            .with_additional(self.core.config().additional_remote_roles.iter().copied());

        let jobs = self.jobs.clone();
        let enqueue_timeout = self.config.enqueue_timeout;
        let serve: ServeFn = Arc::new(
            move |connection: Connection, events: mpsc::Receiver<ConnectionEvent>| {
                enqueue_requests(connection, events, jobs.clone(), enqueue_timeout).boxed()
            },
        );
        self.core.bind(endpoint, expected, serve).await
    }

    /// Accept remote [`ServiceQueueWorker`](crate::ServiceQueueWorker)s on
    /// `endpoint`.
    pub async fn bind_workers(&self, endpoint: &Endpoint) -> Result<Endpoint, MqError> {
        let expected = ExpectedRoles::new(NodeType::ServiceQueueWorker);

        let pool = Arc::clone(&self.pool);
        let stop = self.stop.clone();
        let job_timeout = self.config.job_timeout;
        let serve: ServeFn = Arc::new(
            move |connection: Connection, events: mpsc::Receiver<ConnectionEvent>| {
                remote_worker(
                    connection,
                    events,
                    Arc::clone(&pool),
                    job_timeout,
                    stop.listener(),
                )
                .boxed()
            },
        );
        self.core.bind(endpoint, expected, serve).await
    }

    /// Stop accepting on `endpoint` and close its connections. Idempotent.
    pub async fn unbind(&self, endpoint: &Endpoint) {
        self.core.unbind(endpoint).await;
    }

    /// Stop every worker, unbind everything and close all connections.
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.stop.trigger();
        self.core.shutdown().await;
    }

    /// Jobs waiting for a worker.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    /// Number of connected requesters.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.core.peers().iter().filter(|peer| !peer.is_worker()).count()
    }

    /// Number of connected remote workers.
    #[must_use]
    pub fn remote_worker_count(&self) -> usize {
        self.core.peers().iter().filter(|peer| peer.is_worker()).count()
    }

    /// Snapshot of every connected peer, requesters and remote workers.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerInfo> {
        self.core.peers()
    }

    /// Endpoints currently bound.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.core.endpoints()
    }

    /// Queue sizing in use.
    #[must_use]
    pub fn config(&self) -> &ServiceQueueConfig {
        &self.config
    }

    /// Registry used by the in-process workers.
    #[must_use]
    pub fn registry(&self) -> &Arc<SerializationRegistry> {
        &self.registry
    }

    /// Observe all service queue events from now on.
    #[must_use]
    pub fn events(&self) -> Subscription<ServerEvent> {
        self.core.events().subscribe(EventFilter::all())
    }

    /// Observe selected service queue events as a stream.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream<ServerEvent> {
        self.core.events().event_stream(filter)
    }
}

impl Drop for ServiceQueue {
    fn drop(&mut self) {
        self.stop.trigger();
    }
}

/// Move requests from one client connection into the job queue.
async fn enqueue_requests(
    connection: Connection,
    mut events: mpsc::Receiver<ConnectionEvent>,
    jobs: mpsc::Sender<Job>,
    enqueue_timeout: Duration,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Frame { frame, .. } if frame.kind == FrameKind::Request => {
                let job = Job {
                    request: frame,
                    client: connection.clone(),
                };
                SERVICE_QUEUE_DEPTH.inc();
                match jobs.send_timeout(job, enqueue_timeout).await {
                    Ok(()) => trace!(socket_id = %connection.id(), "Job queued"),
                    Err(SendTimeoutError::Timeout(job)) => {
                        SERVICE_QUEUE_DEPTH.dec();
                        SERVICE_QUEUE_REJECTIONS.inc();
                        warn!(
                            socket_id = %connection.id(),
                            correlation_id = job.request.correlation_id,
                            "Service queue full, rejecting request"
                        );
                        job.reject(ErrorCode::QueueFull, QUEUE_FULL).await;
                    }
                    Err(SendTimeoutError::Closed(job)) => {
                        SERVICE_QUEUE_DEPTH.dec();
                        job.reject(ErrorCode::Failed, QUEUE_CLOSED).await;
                    }
                }
            }
            ConnectionEvent::Frame { frame, .. } => {
                debug!(socket_id = %connection.id(), kind = ?frame.kind, "Ignoring non-request frame");
            }
            ConnectionEvent::Closed { .. } => break,
        }
    }
}

async fn local_worker(
    index: usize,
    pool: JobPool,
    worker: Arc<WorkerDefinition>,
    registry: Arc<SerializationRegistry>,
    mut stop: ShutdownListener,
) {
    loop {
        let job = tokio::select! {
            _ = stop.wait() => break,
            job = next_job(&pool) => job,
        };
        let Some(job) = job else { break };

        trace!(worker = index, correlation_id = job.request.correlation_id, "Job taken");
        let reply = worker.process(&registry, &job.request).await;
        job.reply(reply).await;
    }
    debug!(worker = index, "Local worker stopped");
}

/// How a forwarded job ended.
#[derive(Debug, PartialEq, Eq)]
enum Forwarded {
    Replied,
    Lost,
    Stalled,
}

/// Feed jobs to one remote worker, one at a time.
async fn remote_worker(
    connection: Connection,
    mut events: mpsc::Receiver<ConnectionEvent>,
    pool: JobPool,
    job_timeout: Duration,
    mut stop: ShutdownListener,
) {
    loop {
        let job = tokio::select! {
            _ = stop.wait() => break,
            event = events.recv() => match event {
                Some(ConnectionEvent::Frame { frame, .. }) => {
                    debug!(socket_id = %connection.id(), kind = ?frame.kind, "Unsolicited frame from idle worker");
                    continue;
                }
                Some(ConnectionEvent::Closed { .. }) | None => break,
            },
            job = next_job(&pool) => match job {
                Some(job) => job,
                None => break,
            },
        };

        trace!(
            socket_id = %connection.id(),
            correlation_id = job.request.correlation_id,
            "Job forwarded to remote worker"
        );
        let forwarded = tokio::time::timeout(job_timeout, forward(&connection, &mut events, &job))
            .await
            .unwrap_or(Forwarded::Stalled);
        match forwarded {
            Forwarded::Replied => {}
            Forwarded::Lost => {
                warn!(socket_id = %connection.id(), "Remote worker lost with a job in hand");
                job.reject(ErrorCode::Failed, WORKER_LOST).await;
                break;
            }
            Forwarded::Stalled => {
                warn!(
                    socket_id = %connection.id(),
                    timeout_ms = job_timeout.as_millis() as u64,
                    "Remote worker did not answer in time, dropping it"
                );
                job.reject(ErrorCode::Failed, WORKER_STALLED).await;
                break;
            }
        }
    }
    connection.close();
}

/// Send `job` to a remote worker and relay its reply.
async fn forward(
    worker: &Connection,
    events: &mut mpsc::Receiver<ConnectionEvent>,
    job: &Job,
) -> Forwarded {
    if worker.send(job.request.clone()).await.is_err() {
        return Forwarded::Lost;
    }
    let correlation_id = job.request.correlation_id;
    loop {
        match events.recv().await {
            Some(ConnectionEvent::Frame { frame, .. })
                if frame.kind == FrameKind::Response && frame.correlation_id == correlation_id =>
            {
                job.reply(frame).await;
                return Forwarded::Replied;
            }
            // Workers cannot speak for the queue; their failures are plain.
            Some(ConnectionEvent::Frame { frame, .. })
                if frame.kind == FrameKind::Error && frame.correlation_id == correlation_id =>
            {
                let reason = frame.error_reason().unwrap_or_default();
                job.reject(ErrorCode::Failed, &reason).await;
                return Forwarded::Replied;
            }
            Some(ConnectionEvent::Frame { frame, .. }) => {
                debug!(
                    socket_id = %worker.id(),
                    correlation_id = frame.correlation_id,
                    "Discarding stray worker frame"
                );
            }
            Some(ConnectionEvent::Closed { .. }) | None => return Forwarded::Lost,
        }
    }
}
