//! Socket configuration.

use shared_types::NodeType;
use std::env;
use std::time::Duration;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default timeout for connect, greeting and per-send enqueue.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default queue depth for per-connection channels.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration shared by every socket an engine opens.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Transport connect deadline
    pub connect_timeout: Duration,
    /// Greeting exchange deadline
    pub handshake_timeout: Duration,
    /// Deadline for handing a frame batch to a connection's writer
    pub send_timeout: Duration,
    /// Pending batches per connection writer
    pub outbound_capacity: usize,
    /// Inbound buffering (in-process channels, receive queues)
    pub inbound_capacity: usize,
    /// Largest accepted payload in bytes
    pub max_frame_size: usize,
    /// Remote roles accepted in addition to the engine's primary peer role
    pub additional_remote_roles: Vec<NodeType>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            handshake_timeout: DEFAULT_TIMEOUT,
            send_timeout: DEFAULT_TIMEOUT,
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            inbound_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            additional_remote_roles: Vec::new(),
        }
    }
}

impl SocketConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MQ_CONNECT_TIMEOUT_MS`: Connect deadline (default: 5000)
    /// - `MQ_HANDSHAKE_TIMEOUT_MS`: Greeting deadline (default: 5000)
    /// - `MQ_SEND_TIMEOUT_MS`: Send enqueue deadline (default: 5000)
    /// - `MQ_MAX_FRAME_SIZE`: Largest payload in bytes (default: 16 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            connect_timeout: millis("MQ_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
            handshake_timeout: millis("MQ_HANDSHAKE_TIMEOUT_MS", defaults.handshake_timeout),
            send_timeout: millis("MQ_SEND_TIMEOUT_MS", defaults.send_timeout),
            max_frame_size: env::var("MQ_MAX_FRAME_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_frame_size),
            ..defaults
        }
    }

    /// Set the connect deadline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the greeting deadline.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the send enqueue deadline.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set inbound buffering, at least one.
    #[must_use]
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Set the largest accepted payload.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Accept these remote roles in addition to the primary one.
    #[must_use]
    pub fn with_additional_remote_roles(mut self, roles: Vec<NodeType>) -> Self {
        self.additional_remote_roles = roles;
        self
    }
}
