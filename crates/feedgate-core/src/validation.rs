//! Record validation: the protocol rules a record must satisfy to extend a feed.

use std::cmp::Ordering;

use crate::canonical::{encode_record, signing_bytes};
use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::RejectReason;
use crate::feed::FeedId;
use crate::record::{Record, MAX_RECORD_SIZE, MAX_TYPE_LEN, MIN_TYPE_LEN};
use crate::types::RecordId;

/// Validate that `record` may follow `previous` in the feed owned by `feed_key`.
///
/// `previous` is None when the feed has no accepted record yet. Checks run in
/// order and stop at the first failure:
/// 1. Encoded size limit
/// 2. Content type (skipped for opaque content)
/// 3. Chain linkage, sequence and timestamp ordering
/// 4. Author matches the feed key or its hash
/// 5. Signature
pub fn validate_record(
    record: &Record,
    previous: Option<&Record>,
    feed_key: &Ed25519PublicKey,
) -> Result<(), RejectReason> {
    // 1. Size
    let size = encode_record(record).len();
    if size > MAX_RECORD_SIZE {
        return Err(RejectReason::TooLarge {
            size,
            max: MAX_RECORD_SIZE,
        });
    }

    // 2. Content type
    if !record.content.is_opaque() {
        let kind = record.content.kind().ok_or(RejectReason::TypeNotString)?;
        // Measured in UTF-16 code units, as feed clients count it.
        let len = kind.encode_utf16().count();
        if !(MIN_TYPE_LEN..=MAX_TYPE_LEN).contains(&len) {
            return Err(RejectReason::TypeLength { len });
        }
    }

    // 3. Ordering
    match previous {
        Some(prev) => {
            let expected = RecordId(Blake3Hash::hash(&encode_record(prev)).0);
            if record.previous != Some(expected) {
                return Err(RejectReason::PreviousMismatch {
                    expected,
                    found: record.previous,
                });
            }
            let next_seq = prev.sequence.checked_add(1);
            let not_later = matches!(
                record.timestamp.compare(prev.timestamp),
                Some(Ordering::Less | Ordering::Equal)
            );
            if Some(record.sequence) != next_seq || not_later {
                return Err(RejectReason::OutOfOrder);
            }
        }
        None => {
            if !(record.previous.is_none() && record.sequence == 1 && record.timestamp.is_positive()) {
                return Err(RejectReason::ExpectedInitial);
            }
        }
    }

    // 4. Author
    if !record.author.matches(feed_key) {
        return Err(RejectReason::AuthorMismatch {
            expected: FeedId::Key(*feed_key),
            found: record.author,
        });
    }

    // 5. Signature
    feed_key
        .verify(&signing_bytes(record), &record.signature)
        .map_err(|_| RejectReason::InvalidSignature)?;

    Ok(())
}
