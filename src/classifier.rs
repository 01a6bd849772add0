//! Classification of remote rejection payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One structured error entry from a remote mutation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorEntry {
    /// Structured tag identifying the rejection class
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Authoritative record snapshot embedded by the remote, when present
    #[serde(default)]
    pub data: Option<Value>,
}

/// Category assigned to one mutation attempt's error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Nothing for the reconciler to do
    Ignorable,
    /// A precondition on the request itself failed
    ConditionalCheckFailed,
    /// Base version no longer matches the authoritative version
    ConflictUnhandled,
    /// Tag this engine does not recognize
    Unrecognized(String),
}

const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";
const CONFLICT_UNHANDLED: &str = "ConflictUnhandled";

/// Categorize the error list from one rejected mutation.
///
/// Only single-entry responses are reconciled; empty and multi-error
/// responses are left to the outer pipeline.
pub fn classify(errors: &[RemoteErrorEntry]) -> ErrorCategory {
    let entry = match errors {
        [single] => single,
        [] => return ErrorCategory::Ignorable,
        many => {
            warn!(
                "Remote returned {} errors for one mutation, not reconciling",
                many.len()
            );
            return ErrorCategory::Ignorable;
        }
    };

    match entry.error_type.as_deref() {
        Some(tag) if tag.starts_with(CONDITIONAL_CHECK_FAILED) => {
            ErrorCategory::ConditionalCheckFailed
        }
        Some(tag) if tag.starts_with(CONFLICT_UNHANDLED) => ErrorCategory::ConflictUnhandled,
        Some(tag) => ErrorCategory::Unrecognized(tag.to_string()),
        None => ErrorCategory::Unrecognized(String::new()),
    }
}
