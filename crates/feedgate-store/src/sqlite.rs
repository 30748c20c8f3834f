//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for feedgate. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use feedgate_core::{decode_record, encode_record, FeedId, Record, RecordId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{LogEntry, Store, StoredRecord};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the locked connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}

fn to_sql_sequence(sequence: u64) -> Result<i64> {
    i64::try_from(sequence).map_err(|_| StoreError::SequenceRange(sequence))
}

fn decode_row(key: Vec<u8>, encoded: Vec<u8>) -> Result<StoredRecord> {
    let key = RecordId::try_from(key.as_slice()).map_err(|_| StoreError::Corrupt {
        key: hex_prefix(&key),
        reason: format!("record key has {} bytes", key.len()),
    })?;
    let record = decode_record(&encoded).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(StoredRecord { key, record })
}

fn hex_prefix(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &RecordId) -> Result<Option<Record>> {
        let key = *key;
        self.blocking(move |conn| {
            let row: Option<(Vec<u8>, Vec<u8>)> = conn
                .query_row(
                    "SELECT record_key, encoded FROM records WHERE record_key = ?1",
                    params![key.as_bytes().as_slice()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            row.map(|(key, encoded)| decode_row(key, encoded).map(|stored| stored.record))
                .transpose()
        })
        .await
    }

    async fn get_latest(&self, feed: &FeedId) -> Result<Option<StoredRecord>> {
        let author = feed.to_string();
        self.blocking(move |conn| {
            let row: Option<(Vec<u8>, Vec<u8>)> = conn
                .query_row(
                    "SELECT record_key, encoded FROM records
                     WHERE author = ?1
                     ORDER BY sequence DESC
                     LIMIT 1",
                    params![author],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            row.map(|(key, encoded)| decode_row(key, encoded))
                .transpose()
        })
        .await
    }

    async fn get_at(&self, feed: &FeedId, sequence: u64) -> Result<Option<Record>> {
        let author = feed.to_string();
        let Ok(sequence) = i64::try_from(sequence) else {
            return Ok(None);
        };
        self.blocking(move |conn| {
            let row: Option<(Vec<u8>, Vec<u8>)> = conn
                .query_row(
                    "SELECT record_key, encoded FROM records WHERE author = ?1 AND sequence = ?2",
                    params![author, sequence],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            row.map(|(key, encoded)| decode_row(key, encoded).map(|stored| stored.record))
                .transpose()
        })
        .await
    }

    async fn commit_batch(&self, batch: &[StoredRecord]) -> Result<()> {
        let batch = batch.to_vec();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();
            let mut inserted = 0usize;

            for item in &batch {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM records WHERE record_key = ?1)",
                    params![item.key.as_bytes().as_slice()],
                    |row| row.get(0),
                )?;
                if exists {
                    continue;
                }

                let author = item.record.author.to_string();
                let sequence = to_sql_sequence(item.record.sequence)?;

                let occupant: Option<Vec<u8>> = tx
                    .query_row(
                        "SELECT record_key FROM records WHERE author = ?1 AND sequence = ?2",
                        params![author, sequence],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(existing) = occupant {
                    // Dropping the transaction rolls back the whole batch.
                    let existing = RecordId::try_from(existing.as_slice())
                        .map(|id| id.to_string())
                        .unwrap_or_else(|_| hex_prefix(&existing));
                    return Err(StoreError::Conflict {
                        feed: author,
                        sequence: item.record.sequence,
                        existing,
                    });
                }

                tx.execute(
                    "INSERT INTO records (
                        record_key, author, sequence, timestamp, encoded, committed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        item.key.as_bytes().as_slice(),
                        author,
                        sequence,
                        item.record.timestamp.as_f64(),
                        encode_record(&item.record),
                        now,
                    ],
                )?;
                inserted += 1;
            }

            tx.commit()?;
            debug!(batch = batch.len(), inserted, "committed batch");
            Ok(())
        })
        .await
    }

    async fn read_log(&self, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        let after = i64::try_from(after).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT log_offset, record_key, encoded FROM records
                 WHERE log_offset > ?1
                 ORDER BY log_offset
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![after, limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(offset, key, encoded)| {
                    let stored = decode_row(key, encoded)?;
                    Ok(LogEntry {
                        offset: offset as u64,
                        key: stored.key,
                        record: stored.record,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgate_core::{Content, Keypair, RecordBuilder};

    fn make_chain(keypair: &Keypair, len: u64) -> Vec<StoredRecord> {
        let pk = keypair.public_key();
        let mut chain: Vec<StoredRecord> = Vec::new();
        for seq in 1..=len {
            let mut builder = RecordBuilder::new(pk, seq).timestamp(1000 + seq as i64);
            builder = match chain.last() {
                Some(prev) => builder
                    .previous(prev.key)
                    .content(Content::new("post").with("n", seq)),
                None => builder.content(Content::init(&pk)),
            };
            chain.push(StoredRecord::new(builder.sign(keypair)));
        }
        chain
    }

    #[tokio::test]
    async fn test_commit_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let keypair = Keypair::from_seed(&[1; 32]);
        let chain = make_chain(&keypair, 3);
        let feed = FeedId::Key(keypair.public_key());

        store.commit_batch(&chain).await.unwrap();

        let fetched = store.get(&chain[0].key).await.unwrap().unwrap();
        assert_eq!(fetched, chain[0].record);
        assert_eq!(fetched.compute_id(), chain[0].key);

        let latest = store.get_latest(&feed).await.unwrap().unwrap();
        assert_eq!(latest, chain[2]);

        assert_eq!(
            store.get_at(&feed, 2).await.unwrap(),
            Some(chain[1].record.clone())
        );
        assert_eq!(store.get_at(&feed, u64::MAX).await.unwrap(), None);
        assert_eq!(
            store.get(&RecordId::from_bytes([9; 32])).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_key_hash_feed_is_separate() {
        let store = SqliteStore::open_memory().unwrap();
        let keypair = Keypair::from_seed(&[2; 32]);
        let chain = make_chain(&keypair, 1);
        store.commit_batch(&chain).await.unwrap();

        let hashed = FeedId::KeyHash(keypair.public_key().hash());
        assert_eq!(store.get_latest(&hashed).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_idempotent_commit() {
        let store = SqliteStore::open_memory().unwrap();
        let chain = make_chain(&Keypair::from_seed(&[3; 32]), 2);

        store.commit_batch(&chain).await.unwrap();
        store.commit_batch(&chain[1..]).await.unwrap();

        assert_eq!(store.read_log(0, 100).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_conflict_rolls_back_batch() {
        let store = SqliteStore::open_memory().unwrap();
        let keypair = Keypair::from_seed(&[4; 32]);
        let chain = make_chain(&keypair, 1);
        store.commit_batch(&chain).await.unwrap();

        let bystander = make_chain(&Keypair::from_seed(&[5; 32]), 1);
        let fork = StoredRecord::new(
            RecordBuilder::new(keypair.public_key(), 1)
                .timestamp(77)
                .content(Content::init(&keypair.public_key()))
                .sign(&keypair),
        );

        let result = store.commit_batch(&[bystander[0].clone(), fork]).await;
        assert!(matches!(result, Err(StoreError::Conflict { sequence: 1, .. })));
        assert_eq!(store.get(&bystander[0].key).await.unwrap(), None);
        assert_eq!(store.read_log(0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_log_pages() {
        let store = SqliteStore::open_memory().unwrap();
        let chain = make_chain(&Keypair::from_seed(&[6; 32]), 5);
        store.commit_batch(&chain[..2]).await.unwrap();
        store.commit_batch(&chain[2..]).await.unwrap();

        let first = store.read_log(0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].key, chain[0].key);

        let rest = store.read_log(first[1].offset, 10).await.unwrap();
        let keys: Vec<_> = rest.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![chain[2].key, chain[3].key, chain[4].key]);
        assert!(rest.windows(2).all(|w| w[0].offset < w[1].offset));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        let keypair = Keypair::from_seed(&[7; 32]);
        let chain = make_chain(&keypair, 2);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.commit_batch(&chain).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let latest = store
            .get_latest(&FeedId::Key(keypair.public_key()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.key, chain[1].key);
    }
}
