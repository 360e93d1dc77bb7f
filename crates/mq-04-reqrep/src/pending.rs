//! Pending request store.
//!
//! Maps correlation identifiers to waiting `request` calls.
//!
//! Flow:
//! 1. `request` calls [`PendingRequests::register`] and gets a receiver
//! 2. The request frame goes out carrying the correlation identifier
//! 3. The response loop calls [`PendingRequests::complete`] with the reply
//! 4. `request` awaits the receiver or times out and calls `cancel`

use dashmap::DashMap;
use shared_types::{Frame, MqError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub(crate) type Reply = Result<Frame, MqError>;

#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Reply>>,
    closed: AtomicBool,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a correlation identifier. Fails once the connection is gone.
    pub(crate) fn register(&self) -> Result<(u64, oneshot::Receiver<Reply>), MqError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MqError::Disconnected);
        }
        // Zero is reserved for uncorrelated frames.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // Lost the race with fail_all.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(MqError::Disconnected);
        }
        Ok((id, rx))
    }

    /// Hand a reply to its waiter. Returns false for unknown or expired ids.
    pub(crate) fn complete(&self, frame: Frame) -> bool {
        let correlation_id = frame.correlation_id;
        match self.pending.remove(&correlation_id) {
            Some((_, waiter)) => {
                if waiter.send(Ok(frame)).is_err() {
                    debug!(correlation_id, "Requester stopped waiting");
                    return false;
                }
                true
            }
            None => {
                warn!(correlation_id, "Reply for unknown or expired correlation ID");
                false
            }
        }
    }

    /// Forget a request whose caller gave up.
    pub(crate) fn cancel(&self, correlation_id: u64) {
        self.pending.remove(&correlation_id);
    }

    /// Fail every waiter with `Disconnected` and refuse new registrations.
    pub(crate) fn fail_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(Err(MqError::Disconnected));
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
