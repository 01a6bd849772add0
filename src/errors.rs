//! Error types for conflict reconciliation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Conflict reported for a create mutation")]
    UnexpectedConflictState,

    #[error("Invalid mutation type: {0:?}")]
    InvalidMutationType(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Remote transport is no longer available")]
    TransportUnavailable,

    #[error("Retry dispatch failed: {0}")]
    RetryDispatch(String),
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileError::Decoding(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
