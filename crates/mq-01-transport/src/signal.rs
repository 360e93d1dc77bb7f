//! Shutdown signal shared between a handle and its background tasks.

use std::sync::Arc;
use tokio::sync::watch;

/// One-shot, cloneable shutdown trigger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger the signal. Returns `true` only for the call that flipped it.
    pub fn trigger(&self) -> bool {
        self.sender.send_if_modified(|triggered| {
            if *triggered {
                false
            } else {
                *triggered = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Waiter for use in `tokio::select!`.
    #[must_use]
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a [`Shutdown`] to fire.
#[derive(Debug)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once the signal has fired (immediately if it already has).
    pub async fn wait(&mut self) {
        // Sender gone counts as shutdown.
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}
