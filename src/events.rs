//! Outbound notifications for the owning sync pipeline

use tokio::sync::broadcast;

use crate::model::{MutationEvent, PendingMutation};

/// Notifications other subsystems subscribe to
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The remote rejected a precondition on this mutation
    ConditionalSaveFailed(PendingMutation),
    /// A remote-authoritative change was folded into local storage
    Applied(MutationEvent),
}

/// Broadcast channel for sync notifications.
///
/// Constructed by the owning pipeline and handed to each operation at
/// construction; its lifetime is scoped to the pipeline, not the
/// process.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish to whoever is listening. No subscribers is not an error.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
