//! Cooperative cancellation for reconciliation tasks

use std::sync::Arc;
use tokio::sync::watch;

/// Clonable cancellation token checked at each suspension point.
///
/// Cancellation is cooperative: a storage or transport call already in
/// flight runs to completion before the next checkpoint observes the
/// token.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Request cancellation. Idempotent; all clones observe it.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Non-blocking checkpoint.
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            // The sender lives as long as any token clone, so a closed
            // channel means every token is gone along with this future.
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
