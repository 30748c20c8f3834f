//! Store trait: the abstract interface for record persistence.
//!
//! This trait allows the validator to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use feedgate_core::{FeedId, Record, RecordId};

use crate::error::Result;

/// A record together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: RecordId,
    pub record: Record,
}

impl StoredRecord {
    /// Pair a record with its computed key.
    pub fn new(record: Record) -> Self {
        Self {
            key: record.compute_id(),
            record,
        }
    }
}

/// A record at a position in the store's commit-ordered log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the log, starting at 1 and strictly increasing.
    pub offset: u64,
    pub key: RecordId,
    pub record: Record,
}

/// The Store trait: async interface for record persistence.
///
/// # Design Notes
///
/// - **Atomic batches**: `commit_batch` writes all records or none.
/// - **Order preserving**: records land in the log in batch order.
/// - **Idempotent commits**: a record whose key is already stored is skipped.
/// - **Conflict detection**: a different record at an occupied
///   `(author, sequence)` fails the whole batch with `StoreError::Conflict`.
///
/// The store does not validate records; that is the validator's job.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a record by its key.
    async fn get(&self, key: &RecordId) -> Result<Option<Record>>;

    /// Get the highest-sequence record of a feed.
    async fn get_latest(&self, feed: &FeedId) -> Result<Option<StoredRecord>>;

    /// Get the record at a feed position.
    async fn get_at(&self, feed: &FeedId, sequence: u64) -> Result<Option<Record>>;

    /// Atomically persist a batch of records, preserving their order.
    async fn commit_batch(&self, batch: &[StoredRecord]) -> Result<()>;

    /// Read up to `limit` log entries with `offset > after`, in commit order.
    async fn read_log(&self, after: u64, limit: usize) -> Result<Vec<LogEntry>>;
}
