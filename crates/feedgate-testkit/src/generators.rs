//! Proptest generators for property-based testing.

use proptest::prelude::*;

use feedgate_core::{Content, FeedId, Keypair, Record, RecordBuilder, RecordId, Value};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random RecordId.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 32]>().prop_map(RecordId::from_bytes)
}

/// Generate a content type within the accepted length bounds.
pub fn content_type() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{2,51}".prop_map(String::from)
}

/// Generate a scalar CBOR value for content fields.
pub fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        "[ -~]{0,64}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
        Just(Value::Null),
    ]
}

/// Generate valid structured or opaque content.
pub fn content() -> impl Strategy<Value = Content> {
    prop_oneof![
        4 => (
            content_type(),
            prop::collection::btree_map("[a-z]{1,8}", field_value(), 0..4),
        )
            .prop_map(|(kind, fields)| {
                fields
                    .into_iter()
                    .filter(|(name, _)| name != "type")
                    .fold(Content::new(&kind), |content, (name, value)| {
                        content.with(&name, value)
                    })
            }),
        1 => "[A-Za-z0-9+/]{0,64}".prop_map(Content::Opaque),
    ]
}

/// Parameters for generating a valid feed.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub keypair: Keypair,
    pub hashed_author: bool,
    pub genesis_timestamp: i64,
    /// Strictly positive timestamp increments, one per record after genesis.
    pub steps: Vec<i64>,
    pub contents: Vec<Content>,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            any::<bool>(),
            1i64..=1_700_000_000_000i64,
            prop::collection::vec((1i64..=60_000i64, content()), 0..8),
        )
            .prop_map(|(seed, hashed_author, ts, rest)| {
                let (steps, contents) = rest.into_iter().unzip();
                ChainParams {
                    keypair: Keypair::from_seed(&seed),
                    hashed_author,
                    genesis_timestamp: ts,
                    steps,
                    contents,
                }
            })
            .boxed()
    }
}

impl ChainParams {
    pub fn feed_id(&self) -> FeedId {
        let pk = self.keypair.public_key();
        if self.hashed_author {
            FeedId::KeyHash(pk.hash())
        } else {
            FeedId::Key(pk)
        }
    }
}

/// Build the signed feed described by `params`, genesis first.
pub fn chain_from_params(params: &ChainParams) -> Vec<Record> {
    let author = params.feed_id();
    let pk = params.keypair.public_key();

    let mut records = vec![RecordBuilder::new(author, 1)
        .timestamp(params.genesis_timestamp)
        .content(Content::init(&pk))
        .sign(&params.keypair)];

    for (step, content) in params.steps.iter().zip(&params.contents) {
        let prev = &records[records.len() - 1];
        let record = RecordBuilder::new(author, prev.sequence + 1)
            .previous(prev.compute_id())
            .timestamp(prev.timestamp + *step)
            .content(content.clone())
            .sign(&params.keypair);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgate_core::{decode_record, encode_record, validate_record, RejectReason};

    proptest! {
        #[test]
        fn test_generated_chains_validate(params: ChainParams) {
            let records = chain_from_params(&params);
            let pk = params.keypair.public_key();

            prop_assert_eq!(validate_record(&records[0], None, &pk), Ok(()));
            for pair in records.windows(2) {
                prop_assert_eq!(validate_record(&pair[1], Some(&pair[0]), &pk), Ok(()));
            }
        }

        #[test]
        fn test_encoding_deterministic(params: ChainParams) {
            for record in chain_from_params(&params) {
                let bytes = encode_record(&record);
                prop_assert_eq!(&bytes, &encode_record(&record.clone()));
                prop_assert_eq!(decode_record(&bytes).unwrap().compute_id(), record.compute_id());
            }
        }

        #[test]
        fn test_non_increasing_timestamp_rejected(params: ChainParams, back in 0i64..1000) {
            let records = chain_from_params(&params);
            let prev = &records[0];
            let late = RecordBuilder::new(params.feed_id(), 2)
                .previous(prev.compute_id())
                .timestamp(prev.timestamp - back)
                .content(Content::new("post"))
                .sign(&params.keypair);

            prop_assert_eq!(
                validate_record(&late, Some(prev), &params.keypair.public_key()),
                Err(RejectReason::OutOfOrder)
            );
        }

        #[test]
        fn test_foreign_signature_rejected(params: ChainParams, other in keypair()) {
            prop_assume!(other.public_key() != params.keypair.public_key());
            let pk = params.keypair.public_key();
            let forged = RecordBuilder::new(params.feed_id(), 1)
                .timestamp(params.genesis_timestamp)
                .content(Content::init(&pk))
                .sign(&other);

            prop_assert_eq!(
                validate_record(&forged, None, &pk),
                Err(RejectReason::InvalidSignature)
            );
        }
    }
}
