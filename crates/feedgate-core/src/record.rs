//! Record: one entry in a feed.
//!
//! A record is immutable and signed by the feed's key. It links to its
//! predecessor by hash, so a feed forms a hash chain from its genesis record.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::{encode_record, signing_bytes};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::feed::FeedId;
use crate::types::{RecordId, Timestamp};

/// Maximum canonical encoded size of a record, signature included.
pub const MAX_RECORD_SIZE: usize = 8192;

/// Bounds on the length of a content `type` string.
pub const MIN_TYPE_LEN: usize = 3;
pub const MAX_TYPE_LEN: usize = 52;

/// Content type of the genesis record that declares the feed key.
pub const INIT_TYPE: &str = "init";

/// The payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Encrypted content, carried as an opaque string. Exempt from type checks.
    Opaque(String),
    /// Structured content; must carry a `type` string.
    Object(BTreeMap<String, Value>),
}

impl Content {
    /// Start a structured content object of the given type.
    pub fn new(kind: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert("type".to_string(), Value::Text(kind.to_string()));
        Content::Object(map)
    }

    /// Genesis content declaring the feed's public key.
    pub fn init(key: &Ed25519PublicKey) -> Self {
        Content::new(INIT_TYPE).with("public", FeedId::Key(*key).to_string())
    }

    /// Add a field to structured content. Opaque content is returned unchanged.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        if let Content::Object(map) = &mut self {
            map.insert(field.to_string(), value.into());
        }
        self
    }

    /// The raw `type` field, if this is structured content that has one.
    pub fn type_field(&self) -> Option<&Value> {
        match self {
            Content::Object(map) => map.get("type"),
            Content::Opaque(_) => None,
        }
    }

    /// The `type` string, if present.
    pub fn kind(&self) -> Option<&str> {
        match self.type_field()? {
            Value::Text(kind) => Some(kind.as_str()),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Content::Opaque(_))
    }

    /// Whether this content claims to be a genesis record.
    pub fn is_init(&self) -> bool {
        self.kind() == Some(INIT_TYPE)
    }

    /// The key declared by an init record's `public` field.
    ///
    /// Accepts a key-form feed id or 32 raw bytes.
    pub fn declared_key(&self) -> Option<Ed25519PublicKey> {
        let Content::Object(map) = self else {
            return None;
        };
        if !self.is_init() {
            return None;
        }
        match map.get("public")? {
            Value::Text(text) => text.parse::<FeedId>().ok()?.public_key(),
            Value::Bytes(bytes) => {
                let arr: [u8; 32] = bytes.as_slice().try_into().ok()?;
                Some(Ed25519PublicKey(arr))
            }
            _ => None,
        }
    }
}

/// A complete, signed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Key of the previous record in the feed (None for the genesis record).
    pub previous: Option<RecordId>,

    /// The feed this record belongs to.
    pub author: FeedId,

    /// Position in the feed (1-indexed).
    pub sequence: u64,

    /// Author-claimed timestamp (Unix milliseconds). Untrusted.
    pub timestamp: Timestamp,

    /// The payload.
    pub content: Content,

    /// Ed25519 signature over the canonical encoding without this field.
    pub signature: Ed25519Signature,
}

impl Record {
    /// Compute the record key (Blake3 hash of the canonical encoding).
    pub fn compute_id(&self) -> RecordId {
        RecordId(Blake3Hash::hash(&encode_record(self)).0)
    }

    /// Size of the canonical encoding, signature included.
    pub fn encoded_len(&self) -> usize {
        encode_record(self).len()
    }

    /// Whether this record's content claims to be a genesis record.
    pub fn is_init(&self) -> bool {
        self.content.is_init()
    }
}

/// Builder for creating signed records.
pub struct RecordBuilder {
    author: FeedId,
    sequence: u64,
    previous: Option<RecordId>,
    timestamp: Timestamp,
    content: Content,
}

impl RecordBuilder {
    /// Start building a record.
    pub fn new(author: impl Into<FeedId>, sequence: u64) -> Self {
        Self {
            author: author.into(),
            sequence,
            previous: None,
            timestamp: Timestamp::Millis(0),
            content: Content::Opaque(String::new()),
        }
    }

    /// Set the previous record key.
    pub fn previous(mut self, previous: RecordId) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: impl Into<Timestamp>) -> Self {
        self.timestamp = ts.into();
        self
    }

    /// Set the content.
    pub fn content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    /// Build and sign the record.
    pub fn sign(self, keypair: &Keypair) -> Record {
        let mut record = Record {
            previous: self.previous,
            author: self.author,
            sequence: self.sequence,
            timestamp: self.timestamp,
            content: self.content,
            signature: Ed25519Signature::ZERO,
        };
        record.signature = keypair.sign(&signing_bytes(&record));
        record
    }
}
