//! Reconciliation policy: decide how a rejected mutation converges

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{ReconcileError, Result};
use crate::model::{
    ConflictSnapshot, MutationType, PendingMutation, ResolutionAction, SyncMetadata, VersionedModel,
};
use crate::transport::MutationRequest;

/// Externally supplied conflict policy.
///
/// The handler is consulted once per conflict and returns exactly one
/// action; the request/response shape makes a second or missing
/// resolution unrepresentable.
#[async_trait]
pub trait ConflictHandler: Send + Sync {
    async fn resolve(&self, snapshot: ConflictSnapshot) -> ResolutionAction;
}

#[async_trait]
impl<F> ConflictHandler for F
where
    F: Fn(ConflictSnapshot) -> ResolutionAction + Send + Sync,
{
    async fn resolve(&self, snapshot: ConflictSnapshot) -> ResolutionAction {
        (self)(snapshot)
    }
}

/// Default policy: the remote copy wins.
#[derive(Debug, Default)]
pub struct TakeRemoteHandler;

#[async_trait]
impl ConflictHandler for TakeRemoteHandler {
    async fn resolve(&self, _snapshot: ConflictSnapshot) -> ResolutionAction {
        ResolutionAction::ApplyRemote
    }
}

/// What the controller should do next for one conflicted mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Both sides already agree; nothing to write
    NoOp,
    /// Make the remote copy authoritative locally
    ApplyRemote(VersionedModel),
    /// Remote deleted the record; mirror the deletion locally
    ApplyRemoteDeletion { metadata: SyncMetadata },
    /// Re-issue a corrected mutation against the remote version
    Retry(MutationRequest),
}

/// Decide how to reconcile one rejected mutation against the remote's
/// authoritative state. Performs no I/O beyond awaiting the handler.
pub async fn decide(
    mutation: &PendingMutation,
    remote: &VersionedModel,
    handler: &dyn ConflictHandler,
) -> Result<Decision> {
    let local = mutation.decode_model()?;
    let kind = mutation.kind()?;

    match kind {
        // The remote cannot report a conflict for a record it has never
        // seen; a conflicting create is a protocol violation.
        MutationType::Create => Err(ReconcileError::UnexpectedConflictState),
        MutationType::Delete if remote.metadata.deleted => {
            debug!(
                "Record {} {} already deleted remotely, nothing to reconcile",
                mutation.model_name, mutation.id
            );
            Ok(Decision::NoOp)
        }
        // A remote deletion always wins over a local update.
        MutationType::Update if remote.metadata.deleted => Ok(Decision::ApplyRemoteDeletion {
            metadata: remote.metadata.clone(),
        }),
        kind => {
            let snapshot = ConflictSnapshot {
                local: local.clone(),
                remote: remote.model.clone(),
            };
            let action = handler.resolve(snapshot).await;
            debug!(
                "Conflict policy for {} {} chose {}",
                mutation.model_name,
                mutation.id,
                match &action {
                    ResolutionAction::ApplyRemote => "apply-remote",
                    ResolutionAction::RetryLocal => "retry-local",
                    ResolutionAction::RetryWithMerged(_) => "retry-merged",
                }
            );

            Ok(match action {
                ResolutionAction::ApplyRemote => Decision::ApplyRemote(remote.clone()),
                ResolutionAction::RetryLocal => Decision::Retry(MutationRequest {
                    id: mutation.id.clone(),
                    model_name: mutation.model_name.clone(),
                    mutation_type: kind,
                    payload: local,
                    precondition_version: remote.metadata.version,
                }),
                ResolutionAction::RetryWithMerged(model) => Decision::Retry(MutationRequest {
                    id: mutation.id.clone(),
                    model_name: mutation.model_name.clone(),
                    mutation_type: MutationType::Update,
                    payload: model,
                    precondition_version: remote.metadata.version,
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn mutation(kind: &str) -> PendingMutation {
        PendingMutation {
            id: "t1".to_string(),
            model_name: "Task".to_string(),
            mutation_type: kind.to_string(),
            payload: r#"{"id": "t1", "title": "local"}"#.to_string(),
            base_version: Some(2),
        }
    }

    fn remote(version: u64, deleted: bool) -> VersionedModel {
        VersionedModel {
            model: json!({"id": "t1", "title": "remote"}),
            metadata: SyncMetadata {
                version,
                deleted,
                last_changed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_create_conflict_is_fatal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = move |_: ConflictSnapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResolutionAction::ApplyRemote
        };

        let err = decide(&mutation("create"), &remote(3, false), &handler)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnexpectedConflictState));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_against_deleted_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = move |_: ConflictSnapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResolutionAction::ApplyRemote
        };

        let decision = decide(&mutation("delete"), &remote(5, true), &handler)
            .await
            .unwrap();
        assert_eq!(decision, Decision::NoOp);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_against_deleted_mirrors_deletion() {
        let handler = |_: ConflictSnapshot| ResolutionAction::RetryLocal;

        let decision = decide(&mutation("update"), &remote(5, true), &handler)
            .await
            .unwrap();
        match decision {
            Decision::ApplyRemoteDeletion { metadata } => {
                assert_eq!(metadata.version, 5);
                assert!(metadata.deleted);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_remote_carries_remote_state() {
        let decision = decide(&mutation("update"), &remote(3, false), &TakeRemoteHandler)
            .await
            .unwrap();
        match decision {
            Decision::ApplyRemote(versioned) => {
                assert_eq!(versioned.metadata.version, 3);
                assert_eq!(versioned.model["title"], "remote");
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_local_keeps_mutation_kind_and_payload() {
        let handler = |_: ConflictSnapshot| ResolutionAction::RetryLocal;

        let decision = decide(&mutation("delete"), &remote(4, false), &handler)
            .await
            .unwrap();
        match decision {
            Decision::Retry(request) => {
                assert_eq!(request.mutation_type, MutationType::Delete);
                assert_eq!(request.precondition_version, 4);
                assert_eq!(request.payload["title"], "local");
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_merged_becomes_update() {
        let merged = json!({"id": "t1", "title": "merged"});
        let response = merged.clone();
        let handler = move |_: ConflictSnapshot| ResolutionAction::RetryWithMerged(response.clone());

        let decision = decide(&mutation("delete"), &remote(6, false), &handler)
            .await
            .unwrap();
        match decision {
            Decision::Retry(request) => {
                assert_eq!(request.mutation_type, MutationType::Update);
                assert_eq!(request.precondition_version, 6);
                assert_eq!(request.payload, merged);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_sees_both_sides() {
        let handler = |snapshot: ConflictSnapshot| {
            assert_eq!(snapshot.local["title"], "local");
            assert_eq!(snapshot.remote["title"], "remote");
            ResolutionAction::ApplyRemote
        };

        decide(&mutation("update"), &remote(2, false), &handler)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_local_payload_fails() {
        let mut bad = mutation("update");
        bad.payload = "{broken".to_string();

        let err = decide(&bad, &remote(2, false), &TakeRemoteHandler)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Decoding(_)));
    }

    #[tokio::test]
    async fn test_unknown_mutation_kind_is_fatal() {
        let mut bad = mutation("upsert");
        bad.payload = r#"{"id": "t1"}"#.to_string();

        let err = decide(&bad, &remote(2, false), &TakeRemoteHandler)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidMutationType(_)));
    }
}
