//! Conflict reconciliation for the conflux sync pipeline
//!
//! When the remote store rejects a locally queued mutation with a
//! version conflict or a failed precondition, this crate converges the
//! two sides:
//! - Classifies the structured rejection payload
//! - Decodes the remote's authoritative record snapshot
//! - Consults the pipeline's conflict policy
//! - Either re-issues a corrected mutation or folds the remote state
//!   into local storage, preserving version monotonicity
//!
//! Each resolution attempt is an independent cancellable task with an
//! exactly-once completion.

pub mod cancel;
pub mod classifier;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod model;
pub mod operation;
pub mod policy;
pub mod reconciler;
pub mod transport;

pub use cancel::CancelToken;
pub use classifier::{classify, ErrorCategory, RemoteErrorEntry};
pub use decoder::decode_remote_state;
pub use errors::{ReconcileError, Result};
pub use events::{EventBus, SyncEvent};
pub use model::{
    ConflictSnapshot, MutationEvent, MutationType, PendingMutation, ResolutionAction,
    SyncMetadata, VersionedModel,
};
pub use operation::{ReconcileConfig, ReconcileOperation};
pub use policy::{decide, ConflictHandler, Decision, TakeRemoteHandler};
pub use reconciler::{LocalReconciler, LocalStore};
pub use transport::{ErrorHook, MutationRequest, RemoteTransport, RetryDispatcher};
