//! Strong type definitions for feedgate.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// A 32-byte record identifier, computed as Blake3(encode_record(record)).
///
/// This is the content-address of a record, also called its key. Two records
/// with the same canonical encoding have the same RecordId.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub [u8; 32]);

impl RecordId {
    /// Create a new RecordId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}.blake3", self.to_hex())
    }
}

impl AsRef<[u8]> for RecordId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for RecordId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for RecordId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// An author-claimed timestamp, in Unix milliseconds.
///
/// Records may carry any number here. Integer timestamps keep their integer
/// encoding; anything else is a 64-bit float. Equality is structural, so the
/// two forms of one instant are different records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Float(f64),
}

impl Timestamp {
    pub fn as_f64(self) -> f64 {
        match self {
            Timestamp::Millis(ms) => ms as f64,
            Timestamp::Float(f) => f,
        }
    }

    /// Numeric comparison across both forms. None if either side is NaN.
    pub fn compare(self, other: Timestamp) -> Option<Ordering> {
        match (self, other) {
            (Timestamp::Millis(a), Timestamp::Millis(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    pub fn is_positive(self) -> bool {
        self.compare(Timestamp::Millis(0)) == Some(Ordering::Greater)
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp::Millis(ms)
    }
}

impl From<f64> for Timestamp {
    fn from(f: f64) -> Self {
        Timestamp::Float(f)
    }
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;

    fn add(self, ms: i64) -> Timestamp {
        match self {
            Timestamp::Millis(t) => Timestamp::Millis(t.saturating_add(ms)),
            Timestamp::Float(f) => Timestamp::Float(f + ms as f64),
        }
    }
}

impl Sub<i64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, ms: i64) -> Timestamp {
        match self {
            Timestamp::Millis(t) => Timestamp::Millis(t.saturating_sub(ms)),
            Timestamp::Float(f) => Timestamp::Float(f - ms as f64),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Millis(ms) => write!(f, "{ms}"),
            Timestamp::Float(v) => write!(f, "{v}"),
        }
    }
}
