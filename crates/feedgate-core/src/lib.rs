//! # feedgate core
//!
//! Pure primitives for feedgate: records, feed identities, canonical
//! encoding and the validation rules.
//!
//! This crate contains no I/O, no storage, no async. It is pure computation
//! over signed, hash-chained records.
//!
//! ## Key Types
//!
//! - [`Record`] - One signed entry in a feed
//! - [`RecordId`] - Content-addressed record key (Blake3 hash)
//! - [`FeedId`] - Feed identity: a public key or the hash of one
//! - [`Content`] - Structured or opaque (encrypted) payload
//!
//! ## Validation
//!
//! [`validate_record`] decides whether a record may extend a feed given the
//! feed's previous record and public key. [`Record::from_value`] is the
//! structural check applied to untrusted input before that.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod feed;
pub mod record;
pub mod types;
pub mod validation;

pub use canonical::{decode_record, encode_record, signing_bytes};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, RejectReason, StructuralError};
pub use feed::{is_feed_id, FeedId};
pub use record::{Content, Record, RecordBuilder, INIT_TYPE, MAX_RECORD_SIZE};
pub use types::{RecordId, Timestamp};
pub use validation::validate_record;

pub use ciborium::value::Value;
