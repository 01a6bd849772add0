//! Applying an accepted remote state to local storage

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::errors::{ReconcileError, Result};
use crate::events::{EventBus, SyncEvent};
use crate::model::{MutationEvent, SyncMetadata};

/// Local persistence seam.
///
/// Each call is atomic on its own and concurrent writes to the same
/// record are serialized by the storage layer; the model/metadata pair
/// is not written transactionally.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn save_model(&self, model_name: &str, id: &str, model: &Value) -> Result<()>;
    async fn delete_model(&self, model_name: &str, id: &str) -> Result<()>;
    async fn save_metadata(&self, model_name: &str, id: &str, metadata: &SyncMetadata)
        -> Result<()>;
}

/// Folds a remote-authoritative record into local storage, two-phase:
/// the data write first, then the version metadata.
pub struct LocalReconciler<'a> {
    store: &'a dyn LocalStore,
    events: &'a EventBus,
    cancel: &'a CancelToken,
}

impl<'a> LocalReconciler<'a> {
    pub fn new(store: &'a dyn LocalStore, events: &'a EventBus, cancel: &'a CancelToken) -> Self {
        Self {
            store,
            events,
            cancel,
        }
    }

    /// Make the remote model authoritative for the record.
    pub async fn apply_model(
        &self,
        model_name: &str,
        id: &str,
        model: &Value,
        metadata: &SyncMetadata,
    ) -> Result<MutationEvent> {
        self.store.save_model(model_name, id, model).await?;
        self.finish(model_name, id, metadata).await
    }

    /// Mirror a remote deletion locally.
    pub async fn apply_deletion(
        &self,
        model_name: &str,
        id: &str,
        metadata: &SyncMetadata,
    ) -> Result<MutationEvent> {
        self.store.delete_model(model_name, id).await?;
        self.finish(model_name, id, metadata).await
    }

    /// Second phase: persist the metadata, classify the change, and
    /// publish it. A crash between the two phases leaves the pair
    /// observably out of step until the next reconciliation.
    async fn finish(&self, model_name: &str, id: &str, metadata: &SyncMetadata) -> Result<MutationEvent> {
        self.store.save_metadata(model_name, id, metadata).await?;

        // Writes already in flight ran to completion; a cancel signalled
        // during them is observed here, before the notification goes out.
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let event = MutationEvent {
            id: id.to_string(),
            model_name: model_name.to_string(),
            mutation_type: MutationEvent::classify(metadata.deleted, metadata.version),
            version: metadata.version,
        };

        debug!(
            "Applied remote state for {} {} (version {}, {})",
            model_name, id, metadata.version, event.mutation_type
        );
        self.events.publish(SyncEvent::Applied(event.clone()));
        Ok(event)
    }
}
