//! Core data model for conflict reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::{ReconcileError, Result};

/// Kind of change a mutation or applied record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationType {
    Create,
    Update,
    Delete,
}

impl MutationType {
    /// Parse the wire form. Anything outside the closed set is a
    /// data-integrity violation, not a recoverable conflict.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(ReconcileError::InvalidMutationType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally queued mutation that the remote rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Record id the mutation targets
    pub id: String,
    /// Model (table) name of the record
    pub model_name: String,
    /// Wire form of the mutation kind; validated on use
    pub mutation_type: String,
    /// Serialized JSON of the model as it was sent
    pub payload: String,
    /// Version the mutation was sent against, if any
    pub base_version: Option<u64>,
}

impl PendingMutation {
    /// Decode the serialized model payload.
    pub fn decode_model(&self) -> Result<Value> {
        let model: Value = serde_json::from_str(&self.payload)?;
        if !model.is_object() {
            return Err(ReconcileError::Decoding(format!(
                "mutation payload for {} is not an object",
                self.id
            )));
        }
        Ok(model)
    }

    /// Validated mutation kind.
    pub fn kind(&self) -> Result<MutationType> {
        MutationType::parse(&self.mutation_type)
    }
}

/// Version bookkeeping the remote attaches to every record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    #[serde(rename = "_version")]
    pub version: u64,
    #[serde(rename = "_deleted", default)]
    pub deleted: bool,
    #[serde(rename = "_lastChangedAt", with = "chrono::serde::ts_seconds")]
    pub last_changed_at: DateTime<Utc>,
}

/// A model instance paired with the remote's authoritative metadata
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedModel {
    pub model: Value,
    pub metadata: SyncMetadata,
}

/// Local/remote pair handed to the conflict handler
#[derive(Debug, Clone)]
pub struct ConflictSnapshot {
    pub local: Value,
    pub remote: Value,
}

/// Outcome chosen by the conflict handler for one snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionAction {
    /// Accept the remote copy and fold it into local storage
    ApplyRemote,
    /// Re-send the original local mutation at the remote version
    RetryLocal,
    /// Re-send an update carrying the merged model
    RetryWithMerged(Value),
}

/// Change record published after a successful reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: String,
    pub model_name: String,
    pub mutation_type: MutationType,
    pub version: u64,
}

impl MutationEvent {
    /// Classify an applied change from its metadata alone.
    pub fn classify(deleted: bool, version: u64) -> MutationType {
        if deleted {
            MutationType::Delete
        } else if version == 1 {
            MutationType::Create
        } else {
            MutationType::Update
        }
    }
}
