//! Feed identities.
//!
//! A feed is addressed either by its Ed25519 public key or by the Blake3 hash
//! of that key. Both forms name the same append-only log.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::CoreError;

const SIGIL: char = '@';
const KEY_SUFFIX: &str = ".ed25519";
const HASH_SUFFIX: &str = ".blake3";

/// The identity of a feed, as carried in a record's `author` field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedId {
    /// `@<hex>.ed25519`: the feed's public key.
    Key(Ed25519PublicKey),
    /// `@<hex>.blake3`: the Blake3 hash of the feed's public key.
    KeyHash(Blake3Hash),
}

impl FeedId {
    /// Whether this identity addresses the feed owned by `key`.
    pub fn matches(&self, key: &Ed25519PublicKey) -> bool {
        match self {
            FeedId::Key(k) => k == key,
            FeedId::KeyHash(h) => *h == key.hash(),
        }
    }

    /// The public key, when the identity carries it directly.
    pub fn public_key(&self) -> Option<Ed25519PublicKey> {
        match self {
            FeedId::Key(k) => Some(*k),
            FeedId::KeyHash(_) => None,
        }
    }
}

impl From<Ed25519PublicKey> for FeedId {
    fn from(key: Ed25519PublicKey) -> Self {
        FeedId::Key(key)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedId::Key(k) => write!(f, "{SIGIL}{}{KEY_SUFFIX}", k.to_hex()),
            FeedId::KeyHash(h) => write!(f, "{SIGIL}{}{HASH_SUFFIX}", h.to_hex()),
        }
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedId::Key(k) => write!(f, "FeedId({SIGIL}{}..{KEY_SUFFIX})", &k.to_hex()[..8]),
            FeedId::KeyHash(h) => write!(f, "FeedId({SIGIL}{}..{HASH_SUFFIX})", &h.to_hex()[..8]),
        }
    }
}

impl FromStr for FeedId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidFeedId(s.to_string());
        let body = s.strip_prefix(SIGIL).ok_or_else(invalid)?;

        if let Some(hex) = body.strip_suffix(KEY_SUFFIX) {
            let key = Ed25519PublicKey::from_hex(hex).map_err(|_| invalid())?;
            return Ok(FeedId::Key(key));
        }
        if let Some(hex) = body.strip_suffix(HASH_SUFFIX) {
            let mut arr = [0u8; 32];
            hex::decode_to_slice(hex, &mut arr).map_err(|_| invalid())?;
            return Ok(FeedId::KeyHash(Blake3Hash(arr)));
        }
        Err(invalid())
    }
}

/// Identity format check: is `value` a well-formed feed identity?
pub fn is_feed_id(value: &str) -> bool {
    value.parse::<FeedId>().is_ok()
}

impl Serialize for FeedId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeedId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
