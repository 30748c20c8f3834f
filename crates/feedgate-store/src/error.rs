//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A different record already occupies this feed position.
    #[error("conflict at feed {feed} seq {sequence}: existing record {existing}")]
    Conflict {
        feed: String,
        sequence: u64,
        existing: String,
    },

    /// Sequence number too large for the backing column type.
    #[error("sequence {0} exceeds storable range")]
    SequenceRange(u64),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking store task failed to complete.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Injected or backend-specific failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
