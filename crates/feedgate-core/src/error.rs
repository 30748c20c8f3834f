//! Error types for feedgate core.

use thiserror::Error;

use crate::feed::FeedId;
use crate::types::RecordId;

/// Core errors from cryptographic operations and identity parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid feed id: {0}")]
    InvalidFeedId(String),
}

/// Structural errors: the input is not shaped like a record at all.
///
/// These are reported synchronously and never enter the validation queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("invalid message: not an object")]
    NotAnObject,

    #[error("invalid message: sequence must be a non-negative integer")]
    InvalidSequence,

    #[error("invalid message: author is not a feed id")]
    InvalidAuthor,

    #[error("invalid message: content must be an object or a string")]
    InvalidContent,

    #[error("invalid message: malformed {0}")]
    InvalidField(&'static str),

    #[error("invalid message: undecodable bytes: {0}")]
    Undecodable(String),
}

/// Protocol rule violations: why a record may not extend its feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("encoded message must not be larger than {max} bytes, but was {size}")]
    TooLarge { size: usize, max: usize },

    #[error("type property must be string")]
    TypeNotString,

    #[error("type must be 3 <= length <= 52, but was: {len}")]
    TypeLength { len: usize },

    #[error("expected previous: {expected} but found: {found:?}")]
    PreviousMismatch {
        expected: RecordId,
        found: Option<RecordId>,
    },

    #[error("out of order")]
    OutOfOrder,

    #[error("expected initial message")]
    ExpectedInitial,

    #[error("expected different author: {expected} but found: {found}")]
    AuthorMismatch { expected: FeedId, found: FeedId },

    #[error("signature was invalid")]
    InvalidSignature,

    #[error("seq too high: expected {expected}, got {got}")]
    SequenceTooHigh { expected: u64, got: u64 },

    #[error("feed public key unknown: first record must be an init message declaring it")]
    MissingFeedKey,
}
