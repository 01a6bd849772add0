//! Decoding of the authoritative remote snapshot embedded in an error entry

use serde_json::Value;

use crate::classifier::RemoteErrorEntry;
use crate::errors::{ReconcileError, Result};
use crate::model::{SyncMetadata, VersionedModel};

const METADATA_FIELDS: [&str; 3] = ["_version", "_deleted", "_lastChangedAt"];

/// Extract the remote's authoritative record from a rejection entry.
///
/// The remote inlines its sync metadata alongside the model's own
/// fields; the metadata is split out and the remaining object is the
/// model instance. Pure, no side effects.
pub fn decode_remote_state(entry: &RemoteErrorEntry) -> Result<VersionedModel> {
    let data = entry.data.as_ref().ok_or_else(|| {
        ReconcileError::Decoding("error entry carries no remote state".to_string())
    })?;

    let object = match data {
        Value::Object(map) => map,
        other => {
            return Err(ReconcileError::Decoding(format!(
                "remote state is not an object: {}",
                other
            )))
        }
    };

    let metadata: SyncMetadata = serde_json::from_value(data.clone())?;
    if metadata.version == 0 {
        return Err(ReconcileError::Decoding(
            "remote version must be a positive integer".to_string(),
        ));
    }

    let mut model = object.clone();
    for field in METADATA_FIELDS {
        model.remove(field);
    }

    Ok(VersionedModel {
        model: Value::Object(model),
        metadata,
    })
}
