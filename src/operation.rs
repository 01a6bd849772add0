//! Cancellable lifecycle for one conflict-resolution attempt
//!
//! Drives the flow for a single rejected mutation:
//! classify → decode remote state → policy → retry dispatch or local
//! apply, completing exactly once with either the applied change
//! (`None` for no-op outcomes) or a classified error.

use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::classifier::{classify, ErrorCategory, RemoteErrorEntry};
use crate::decoder::decode_remote_state;
use crate::errors::{ReconcileError, Result};
use crate::events::{EventBus, SyncEvent};
use crate::model::{MutationEvent, PendingMutation};
use crate::policy::{decide, ConflictHandler, Decision, TakeRemoteHandler};
use crate::reconciler::{LocalReconciler, LocalStore};
use crate::transport::{ErrorHook, RemoteTransport, RetryDispatcher};

/// Externally supplied policy and error hook for the owning pipeline
#[derive(Clone)]
pub struct ReconcileConfig {
    /// Decides conflicts between local and remote copies
    pub conflict_handler: Arc<dyn ConflictHandler>,
    /// Receives errors from fire-and-forget retry requests
    pub error_handler: ErrorHook,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            conflict_handler: Arc::new(TakeRemoteHandler),
            error_handler: Arc::new(|e| warn!("Retry mutation error: {}", e)),
        }
    }
}

/// One conflict-resolution attempt for one rejected mutation.
///
/// Each attempt is an independent task; many may run concurrently for
/// distinct records. The transport reference is non-owning and its
/// absence at dispatch time is fatal for the attempt.
pub struct ReconcileOperation {
    operation_id: String,
    mutation: PendingMutation,
    errors: Vec<RemoteErrorEntry>,
    config: ReconcileConfig,
    transport: Weak<dyn RemoteTransport>,
    store: Arc<dyn LocalStore>,
    events: EventBus,
    cancel: CancelToken,
}

impl ReconcileOperation {
    pub fn new(
        mutation: PendingMutation,
        errors: Vec<RemoteErrorEntry>,
        config: ReconcileConfig,
        transport: Weak<dyn RemoteTransport>,
        store: Arc<dyn LocalStore>,
        events: EventBus,
        cancel: CancelToken,
    ) -> Self {
        let operation_id = format!(
            "{}_{}_{}",
            mutation.model_name,
            mutation.id,
            chrono::Utc::now().timestamp_millis()
        );

        Self {
            operation_id,
            mutation,
            errors,
            config,
            transport,
            store,
            events,
            cancel,
        }
    }

    /// Token shared with the owning pipeline for cooperative shutdown.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the attempt to completion. Consuming `self` makes the
    /// single-shot completion contract structural: the returned future
    /// resolves exactly once.
    pub async fn run(self) -> Result<Option<MutationEvent>> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        match classify(&self.errors) {
            ErrorCategory::Ignorable => {
                debug!("[{}] Nothing to reconcile", self.operation_id);
                Ok(None)
            }
            ErrorCategory::Unrecognized(tag) => {
                warn!(
                    "[{}] Unrecognized remote error tag {:?}, leaving to outer pipeline",
                    self.operation_id, tag
                );
                Ok(None)
            }
            ErrorCategory::ConditionalCheckFailed => {
                info!(
                    "[{}] Conditional save failed for {} {}",
                    self.operation_id, self.mutation.model_name, self.mutation.id
                );
                self.events
                    .publish(SyncEvent::ConditionalSaveFailed(self.mutation.clone()));
                Ok(None)
            }
            ErrorCategory::ConflictUnhandled => self.reconcile_conflict().await,
        }
    }

    /// Spawn as an independent task. Completion is delivered through
    /// the handle, off the triggering call stack.
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<Option<MutationEvent>>> {
        tokio::spawn(self.run())
    }

    async fn reconcile_conflict(self) -> Result<Option<MutationEvent>> {
        // The classifier only yields ConflictUnhandled for a single entry.
        let entry = self.errors.first().ok_or_else(|| {
            ReconcileError::Decoding("conflict response carries no error entry".to_string())
        })?;
        let remote = decode_remote_state(entry)?;
        debug!(
            "[{}] Remote state at version {} (deleted: {})",
            self.operation_id, remote.metadata.version, remote.metadata.deleted
        );

        let decision = decide(
            &self.mutation,
            &remote,
            self.config.conflict_handler.as_ref(),
        )
        .await?;

        match decision {
            Decision::NoOp => {
                debug!("[{}] Both sides agree, no-op", self.operation_id);
                Ok(None)
            }
            Decision::Retry(request) => {
                if self.cancel.is_cancelled() {
                    return Err(ReconcileError::Cancelled);
                }
                let dispatcher =
                    RetryDispatcher::new(self.transport.clone(), self.config.error_handler.clone());
                dispatcher.dispatch(request)?;
                info!("[{}] Corrective retry dispatched", self.operation_id);
                Ok(None)
            }
            Decision::ApplyRemote(versioned) => {
                if self.cancel.is_cancelled() {
                    return Err(ReconcileError::Cancelled);
                }
                let reconciler = LocalReconciler::new(self.store.as_ref(), &self.events, &self.cancel);
                let event = reconciler
                    .apply_model(
                        &self.mutation.model_name,
                        &self.mutation.id,
                        &versioned.model,
                        &versioned.metadata,
                    )
                    .await?;
                Ok(Some(event))
            }
            Decision::ApplyRemoteDeletion { metadata } => {
                if self.cancel.is_cancelled() {
                    return Err(ReconcileError::Cancelled);
                }
                let reconciler = LocalReconciler::new(self.store.as_ref(), &self.events, &self.cancel);
                let event = reconciler
                    .apply_deletion(&self.mutation.model_name, &self.mutation.id, &metadata)
                    .await?;
                Ok(Some(event))
            }
        }
    }
}
