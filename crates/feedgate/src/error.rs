//! Error types for the validator.

use feedgate_core::{RejectReason, StructuralError};
use feedgate_store::StoreError;
use thiserror::Error;

/// Errors delivered to a submitter.
#[derive(Debug, Error)]
pub enum ValidateError {
    /// Malformed input, rejected before it was queued.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// The record broke a protocol rule.
    #[error(transparent)]
    Rejected(#[from] RejectReason),

    /// A different record is already stored at this feed position.
    #[error("a different record is already stored at sequence {sequence}")]
    Conflict { sequence: u64 },

    /// Storage error while looking up a stored record.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The batch carrying this record failed to commit.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The validator task is gone.
    #[error("validator has shut down")]
    Closed,
}

impl ValidateError {
    /// The protocol rule that rejected the record, if any.
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            ValidateError::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Result type for validator operations.
pub type Result<T> = std::result::Result<T, ValidateError>;
