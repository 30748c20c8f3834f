//! Test fixtures and helpers.
//!
//! A [`FeedFixture`] owns a keypair and tracks the head of the feed it is
//! writing, so tests can produce valid continuations without bookkeeping.

use feedgate_core::{
    Content, Ed25519PublicKey, FeedId, Keypair, Record, RecordBuilder, RecordId,
};

/// Timestamp of the first record a fixture writes.
pub const GENESIS_TIMESTAMP: i64 = 1_000;

/// A feed author for tests.
pub struct FeedFixture {
    pub keypair: Keypair,
    author: FeedId,
    head: Option<Record>,
}

impl FeedFixture {
    /// Create a fixture with a deterministic keypair, writing as `@key.ed25519`.
    pub fn new(seed: u8) -> Self {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let author = FeedId::Key(keypair.public_key());
        Self {
            keypair,
            author,
            head: None,
        }
    }

    /// Like [`FeedFixture::new`], but writing as `@hash.blake3`.
    pub fn hashed(seed: u8) -> Self {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let author = FeedId::KeyHash(keypair.public_key().hash());
        Self {
            keypair,
            author,
            head: None,
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// The author form this fixture writes records with.
    pub fn feed_id(&self) -> FeedId {
        self.author
    }

    /// The last record this fixture produced.
    pub fn head(&self) -> Option<&Record> {
        self.head.as_ref()
    }

    /// Produce the next valid record of the feed and advance.
    ///
    /// The first call yields the genesis `init` record and ignores `content`.
    pub fn append(&mut self, content: Content) -> Record {
        let record = match &self.head {
            None => self.genesis(),
            Some(prev) => self
                .build(prev.sequence + 1)
                .previous(prev.compute_id())
                .timestamp(prev.timestamp + 1)
                .content(content)
                .sign(&self.keypair),
        };
        self.head = Some(record.clone());
        record
    }

    /// Append a `post` record carrying `text`.
    pub fn post(&mut self, text: &str) -> Record {
        self.append(Content::new("post").with("text", text))
    }

    /// Produce `len` valid records starting from the current head.
    pub fn chain(&mut self, len: usize) -> Vec<Record> {
        (0..len)
            .map(|i| self.append(Content::new("post").with("n", i as u64)))
            .collect()
    }

    /// The genesis record of this feed. Does not advance.
    pub fn genesis(&self) -> Record {
        self.build(1)
            .timestamp(GENESIS_TIMESTAMP)
            .content(Content::init(&self.keypair.public_key()))
            .sign(&self.keypair)
    }

    /// A builder for an arbitrary record of this feed. Does not advance.
    pub fn build(&self, sequence: u64) -> RecordBuilder {
        RecordBuilder::new(self.author, sequence)
    }

    /// Key of the current head, if any.
    pub fn head_key(&self) -> Option<RecordId> {
        self.head.as_ref().map(Record::compute_id)
    }
}

/// Create fixtures with distinct deterministic keys.
pub fn multi_feed_fixtures(count: usize) -> Vec<FeedFixture> {
    (0..count)
        .map(|i| FeedFixture::new(i as u8 + 1))
        .collect()
}
