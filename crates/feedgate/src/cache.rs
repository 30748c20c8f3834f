//! Latest-state cache: the most recently accepted record of every feed the
//! validator has seen.
//!
//! Each feed moves through an explicit state machine:
//!
//! ```text
//! Unloaded --begin_loading--> Loading --complete--> Ready
//!    ^                                                |
//!    +---------------------evict----------------------+
//! ```
//!
//! Only one hydration runs per feed. While a feed is `Loading`, callers asking
//! for its latest record are parked and answered when hydration completes.

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use feedgate_core::{Ed25519PublicKey, FeedId, Record, RecordId};
use feedgate_store::{Store, StoreError};

/// In-memory head of one feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedHead {
    /// Key of the latest accepted record.
    pub key: Option<RecordId>,
    /// The latest accepted record.
    pub record: Option<Record>,
    /// The feed's public key, once known.
    pub public_key: Option<Ed25519PublicKey>,
}

impl FeedHead {
    /// Sequence number of the latest record, if any.
    pub fn latest_sequence(&self) -> Option<u64> {
        self.record.as_ref().map(|r| r.sequence)
    }

    pub fn snapshot(&self) -> LatestSnapshot {
        LatestSnapshot {
            key: self.key,
            value: self.record.clone(),
            kind: OpKind::Put,
            public: self.public_key,
            ready: true,
        }
    }
}

/// Operation tag of a [`LatestSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Put,
}

/// The latest state of a feed as reported to callers.
///
/// Unknown feeds are reported with empty fields and `ready: true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSnapshot {
    #[serde(serialize_with = "display_opt")]
    pub key: Option<RecordId>,
    pub value: Option<Record>,
    #[serde(rename = "type")]
    pub kind: OpKind,
    #[serde(serialize_with = "feed_key_opt")]
    pub public: Option<Ed25519PublicKey>,
    pub ready: bool,
}

fn display_opt<S: Serializer>(key: &Option<RecordId>, serializer: S) -> Result<S::Ok, S::Error> {
    match key {
        Some(key) => serializer.collect_str(key),
        None => serializer.serialize_none(),
    }
}

fn feed_key_opt<S: Serializer>(
    key: &Option<Ed25519PublicKey>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match key {
        Some(key) => serializer.collect_str(&FeedId::Key(*key)),
        None => serializer.serialize_none(),
    }
}

/// Parked `get_latest` caller.
pub(crate) type Waiter = oneshot::Sender<LatestSnapshot>;

enum Entry {
    Loading { waiters: Vec<Waiter> },
    Ready(FeedHead),
}

/// Read-only view of one feed's cache entry.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Hydration<'a> {
    Unloaded,
    Loading,
    Ready(&'a FeedHead),
}

/// Per-feed latest state, keyed by the author form records are written with.
#[derive(Default)]
pub(crate) struct LatestCache {
    entries: HashMap<FeedId, Entry>,
}

impl LatestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, feed: &FeedId) -> Hydration<'_> {
        match self.entries.get(feed) {
            None => Hydration::Unloaded,
            Some(Entry::Loading { .. }) => Hydration::Loading,
            Some(Entry::Ready(head)) => Hydration::Ready(head),
        }
    }

    /// Move an unloaded feed to `Loading`.
    ///
    /// Returns false if the feed is already loading or ready, in which case
    /// the caller must not start another hydration.
    pub fn begin_loading(&mut self, feed: FeedId) -> bool {
        if self.entries.contains_key(&feed) {
            return false;
        }
        self.entries.insert(feed, Entry::Loading { waiters: Vec::new() });
        true
    }

    /// Park a waiter on a loading feed. Hands the waiter back otherwise.
    pub fn park(&mut self, feed: &FeedId, waiter: Waiter) -> Result<(), Waiter> {
        match self.entries.get_mut(feed) {
            Some(Entry::Loading { waiters }) => {
                waiters.push(waiter);
                Ok(())
            }
            _ => Err(waiter),
        }
    }

    /// Finish hydration. Returns the waiters parked while loading.
    pub fn complete(&mut self, feed: FeedId, head: FeedHead) -> Vec<Waiter> {
        match self.entries.insert(feed, Entry::Ready(head)) {
            Some(Entry::Loading { waiters }) => waiters,
            _ => Vec::new(),
        }
    }

    /// Record a newly accepted record as the feed's head.
    pub fn advance(
        &mut self,
        feed: FeedId,
        key: RecordId,
        record: Record,
        public_key: Ed25519PublicKey,
    ) {
        let head = FeedHead {
            key: Some(key),
            record: Some(record),
            public_key: Some(public_key),
        };
        self.entries.insert(feed, Entry::Ready(head));
    }

    /// Forget a ready feed so the next reference hydrates it again.
    pub fn evict(&mut self, feed: &FeedId) -> bool {
        if matches!(self.entries.get(feed), Some(Entry::Ready(_))) {
            self.entries.remove(feed);
            true
        } else {
            false
        }
    }

    /// Number of hydrations in flight.
    pub fn loading(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Loading { .. }))
            .count()
    }
}

/// Load a feed's head from the store.
///
/// Store errors degrade to an empty head: the feed is treated as unknown.
pub(crate) async fn hydrate<S: Store + ?Sized>(store: &S, feed: &FeedId) -> FeedHead {
    match load_head(store, feed).await {
        Ok(head) => {
            debug!(%feed, seq = ?head.latest_sequence(), "feed hydrated");
            head
        }
        Err(e) => {
            warn!(%feed, error = %e, "hydration failed, treating feed as empty");
            FeedHead::default()
        }
    }
}

async fn load_head<S: Store + ?Sized>(
    store: &S,
    feed: &FeedId,
) -> Result<FeedHead, StoreError> {
    let Some(latest) = store.get_latest(feed).await? else {
        return Ok(FeedHead::default());
    };

    // Hash-form feeds only reveal their key through the genesis record.
    let public_key = match feed.public_key() {
        Some(key) => Some(key),
        None => store
            .get_at(feed, 1)
            .await?
            .and_then(|genesis| genesis.content.declared_key()),
    };

    Ok(FeedHead {
        key: Some(latest.key),
        record: Some(latest.record),
        public_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgate_core::{Content, Keypair, RecordBuilder};
    use feedgate_store::{MemoryStore, StoredRecord};

    fn feed(seed: u8) -> (Keypair, FeedId) {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let feed = FeedId::Key(keypair.public_key());
        (keypair, feed)
    }

    fn genesis(keypair: &Keypair, author: FeedId) -> Record {
        RecordBuilder::new(author, 1)
            .timestamp(1000)
            .content(Content::init(&keypair.public_key()))
            .sign(keypair)
    }

    #[test]
    fn test_state_machine() {
        let (_, id) = feed(1);
        let mut cache = LatestCache::new();

        assert!(matches!(cache.state(&id), Hydration::Unloaded));
        assert!(cache.begin_loading(id));
        assert!(!cache.begin_loading(id));
        assert!(matches!(cache.state(&id), Hydration::Loading));
        assert_eq!(cache.loading(), 1);

        let waiters = cache.complete(id, FeedHead::default());
        assert!(waiters.is_empty());
        assert!(matches!(cache.state(&id), Hydration::Ready(h) if h.record.is_none()));
        assert!(!cache.begin_loading(id));
        assert_eq!(cache.loading(), 0);

        assert!(cache.evict(&id));
        assert!(matches!(cache.state(&id), Hydration::Unloaded));
    }

    #[test]
    fn test_evict_ignores_loading() {
        let (_, id) = feed(2);
        let mut cache = LatestCache::new();
        cache.begin_loading(id);
        assert!(!cache.evict(&id));
        assert!(matches!(cache.state(&id), Hydration::Loading));
    }

    #[tokio::test]
    async fn test_parked_waiters_returned_on_complete() {
        let (_, id) = feed(3);
        let mut cache = LatestCache::new();

        let (tx, _rx) = oneshot::channel();
        assert!(cache.park(&id, tx).is_err());

        cache.begin_loading(id);
        let (tx, rx) = oneshot::channel();
        assert!(cache.park(&id, tx).is_ok());

        let head = FeedHead::default();
        for waiter in cache.complete(id, head.clone()) {
            waiter.send(head.snapshot()).unwrap();
        }
        let snapshot = rx.await.unwrap();
        assert!(snapshot.ready);
        assert_eq!(snapshot.value, None);
    }

    #[test]
    fn test_advance_replaces_head() {
        let (keypair, id) = feed(4);
        let mut cache = LatestCache::new();
        let record = genesis(&keypair, id);
        let key = record.compute_id();

        cache.advance(id, key, record.clone(), keypair.public_key());
        let Hydration::Ready(head) = cache.state(&id) else {
            panic!("expected ready head");
        };
        assert_eq!(head.key, Some(key));
        assert_eq!(head.latest_sequence(), Some(1));
        assert_eq!(head.public_key, Some(keypair.public_key()));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let empty = FeedHead::default().snapshot();
        let json = serde_json::to_value(&empty).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": null,
                "value": null,
                "type": "put",
                "public": null,
                "ready": true,
            })
        );

        let (keypair, id) = feed(5);
        let record = genesis(&keypair, id);
        let head = FeedHead {
            key: Some(record.compute_id()),
            record: Some(record.clone()),
            public_key: Some(keypair.public_key()),
        };
        let json = serde_json::to_value(head.snapshot()).unwrap();
        assert_eq!(json["key"], record.compute_id().to_string());
        assert_eq!(json["public"], id.to_string());
    }

    #[tokio::test]
    async fn test_hydrate_unknown_feed() {
        let store = MemoryStore::new();
        let (_, id) = feed(6);
        assert_eq!(hydrate(&store, &id).await, FeedHead::default());
    }

    #[tokio::test]
    async fn test_hydrate_key_feed() {
        let store = MemoryStore::new();
        let (keypair, id) = feed(7);
        let record = genesis(&keypair, id);
        store
            .commit_batch(&[StoredRecord::new(record.clone())])
            .await
            .unwrap();

        let head = hydrate(&store, &id).await;
        assert_eq!(head.record, Some(record.clone()));
        assert_eq!(head.key, Some(record.compute_id()));
        assert_eq!(head.public_key, Some(keypair.public_key()));
    }

    #[tokio::test]
    async fn test_hydrate_hash_feed_recovers_key_from_genesis() {
        let store = MemoryStore::new();
        let keypair = Keypair::from_seed(&[8; 32]);
        let id = FeedId::KeyHash(keypair.public_key().hash());
        let first = genesis(&keypair, id);
        let second = RecordBuilder::new(id, 2)
            .previous(first.compute_id())
            .timestamp(2000)
            .content(Content::new("post"))
            .sign(&keypair);
        store
            .commit_batch(&[
                StoredRecord::new(first),
                StoredRecord::new(second.clone()),
            ])
            .await
            .unwrap();

        let head = hydrate(&store, &id).await;
        assert_eq!(head.record, Some(second));
        assert_eq!(head.public_key, Some(keypair.public_key()));
    }
}
