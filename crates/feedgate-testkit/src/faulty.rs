//! A store wrapper that counts calls, injects failures and can hold commits.
//!
//! Wraps any [`Store`] (a [`MemoryStore`] by default) so tests can observe
//! how often the validator hits storage and steer it through error paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use feedgate_core::{FeedId, Record, RecordId};
use feedgate_store::{LogEntry, MemoryStore, Result, Store, StoreError, StoredRecord};

pub struct FaultyStore<S = MemoryStore> {
    inner: S,
    fail_latest: AtomicBool,
    fail_commit: AtomicBool,
    fail_get: AtomicBool,
    latest_calls: AtomicUsize,
    get_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    held: watch::Sender<bool>,
    commits_started: watch::Sender<usize>,
}

impl FaultyStore<MemoryStore> {
    pub fn new() -> Self {
        Self::wrap(MemoryStore::new())
    }
}

impl Default for FaultyStore<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> FaultyStore<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            fail_latest: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            latest_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            held: watch::Sender::new(false),
            commits_started: watch::Sender::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make `get_latest` and `get_at` fail.
    pub fn fail_latest(&self, fail: bool) {
        self.fail_latest.store(fail, Ordering::SeqCst);
    }

    /// Make `commit_batch` fail.
    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make `get` fail.
    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_latest` calls so far.
    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    /// Number of `get` calls so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Sizes of every batch passed to `commit_batch`, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default()
    }

    /// Block commits until [`FaultyStore::release_commits`] is called.
    pub fn hold_commits(&self) {
        self.held.send_replace(true);
    }

    pub fn release_commits(&self) {
        self.held.send_replace(false);
    }

    /// Wait until at least `count` commits have started.
    pub async fn wait_for_commits(&self, count: usize) {
        let mut rx = self.commits_started.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

#[async_trait]
impl<S: Store> Store for FaultyStore<S> {
    async fn get(&self, key: &RecordId) -> Result<Option<Record>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.inner.get(key).await
    }

    async fn get_latest(&self, feed: &FeedId) -> Result<Option<StoredRecord>> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(injected("latest"));
        }
        self.inner.get_latest(feed).await
    }

    async fn get_at(&self, feed: &FeedId, sequence: u64) -> Result<Option<Record>> {
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(injected("position"));
        }
        self.inner.get_at(feed, sequence).await
    }

    async fn commit_batch(&self, batch: &[StoredRecord]) -> Result<()> {
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(batch.len());
        }
        self.commits_started.send_modify(|started| *started += 1);

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(injected("commit"));
        }
        self.inner.commit_batch(batch).await
    }

    async fn read_log(&self, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        self.inner.read_log(after, limit).await
    }
}
