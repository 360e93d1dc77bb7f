//! ServiceQueue configuration.

use std::env;
use std::time::Duration;

/// Worker pool and job queue sizing.
#[derive(Debug, Clone)]
pub struct ServiceQueueConfig {
    /// In-process workers; zero means only remote workers serve
    pub workers: usize,
    /// Jobs that may wait for a worker
    pub queue_capacity: usize,
    /// How long a request waits for queue space before rejection
    pub enqueue_timeout: Duration,
    /// How long a remote worker may hold a job before it is dropped
    pub job_timeout: Duration,
}

impl Default for ServiceQueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_secs(1),
            job_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceQueueConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MQ_SERVICE_WORKERS`: In-process workers (default: 4)
    /// - `MQ_SERVICE_QUEUE_CAPACITY`: Waiting jobs (default: 1024)
    /// - `MQ_SERVICE_ENQUEUE_TIMEOUT_MS`: Wait for queue space (default: 1000)
    /// - `MQ_SERVICE_JOB_TIMEOUT_MS`: Remote worker reply deadline (default: 30000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env::var("MQ_SERVICE_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.workers),
            queue_capacity: env::var("MQ_SERVICE_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.queue_capacity),
            enqueue_timeout: env::var("MQ_SERVICE_ENQUEUE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.enqueue_timeout),
            job_timeout: env::var("MQ_SERVICE_JOB_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.job_timeout),
        }
    }

    /// Set the number of in-process workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the job queue capacity (at least one).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set how long a request waits for queue space.
    #[must_use]
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Set how long a remote worker may take to answer one job.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}
