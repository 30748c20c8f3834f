//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use feedgate_core::{FeedId, Record, RecordId};

use crate::error::{Result, StoreError};
use crate::traits::{LogEntry, Store, StoredRecord};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records indexed by key.
    records: HashMap<RecordId, Record>,

    /// Feed index: author -> (sequence -> key).
    feeds: HashMap<FeedId, BTreeMap<u64, RecordId>>,

    /// Keys in commit order; offset = index + 1.
    log: Vec<RecordId>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Number of records stored.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn key_at(&self, feed: &FeedId, sequence: u64) -> Option<RecordId> {
        self.feeds.get(feed)?.get(&sequence).copied()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &RecordId) -> Result<Option<Record>> {
        Ok(self.read()?.records.get(key).cloned())
    }

    async fn get_latest(&self, feed: &FeedId) -> Result<Option<StoredRecord>> {
        let inner = self.read()?;
        let latest = inner
            .feeds
            .get(feed)
            .and_then(|seqs| seqs.last_key_value())
            .and_then(|(_, key)| {
                inner.records.get(key).map(|record| StoredRecord {
                    key: *key,
                    record: record.clone(),
                })
            });
        Ok(latest)
    }

    async fn get_at(&self, feed: &FeedId, sequence: u64) -> Result<Option<Record>> {
        let inner = self.read()?;
        Ok(inner
            .key_at(feed, sequence)
            .and_then(|key| inner.records.get(&key).cloned()))
    }

    async fn commit_batch(&self, batch: &[StoredRecord]) -> Result<()> {
        let mut inner = self.write()?;

        // Check the whole batch before touching anything.
        let mut claimed: HashMap<(FeedId, u64), RecordId> = HashMap::new();
        for item in batch {
            if inner.records.contains_key(&item.key) {
                continue;
            }
            let position = (item.record.author, item.record.sequence);
            let existing = inner
                .key_at(&position.0, position.1)
                .or_else(|| claimed.get(&position).copied());
            match existing {
                Some(existing) if existing != item.key => {
                    return Err(StoreError::Conflict {
                        feed: position.0.to_string(),
                        sequence: position.1,
                        existing: existing.to_string(),
                    });
                }
                _ => {
                    claimed.insert(position, item.key);
                }
            }
        }

        for item in batch {
            if inner.records.contains_key(&item.key) {
                continue;
            }
            inner
                .feeds
                .entry(item.record.author)
                .or_default()
                .insert(item.record.sequence, item.key);
            inner.records.insert(item.key, item.record.clone());
            inner.log.push(item.key);
        }

        Ok(())
    }

    async fn read_log(&self, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        let inner = self.read()?;
        let start = usize::try_from(after).unwrap_or(usize::MAX);

        let entries = inner
            .log
            .iter()
            .enumerate()
            .skip(start)
            .take(limit)
            .filter_map(|(index, key)| {
                inner.records.get(key).map(|record| LogEntry {
                    offset: index as u64 + 1,
                    key: *key,
                    record: record.clone(),
                })
            })
            .collect();

        Ok(entries)
    }
}
