//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - Floats always use the 64-bit form
//!
//! The canonical encoding is what gets hashed (record keys, `previous` links)
//! and signed, so the same logical record must always produce the same bytes.
//!
//! This module is also the structural checker: [`Record::from_value`] turns an
//! untrusted CBOR value into a typed record or a [`StructuralError`].

use ciborium::value::{Integer, Value};
use std::collections::BTreeMap;

use crate::crypto::Ed25519Signature;
use crate::error::StructuralError;
use crate::feed::FeedId;
use crate::record::{Content, Record};
use crate::types::{RecordId, Timestamp};

/// Record field keys (integer keys for compact encoding).
mod keys {
    pub const PREVIOUS: u64 = 0;
    pub const AUTHOR: u64 = 1;
    pub const SEQUENCE: u64 = 2;
    pub const TIMESTAMP: u64 = 3;
    pub const CONTENT: u64 = 4;
    pub const SIGNATURE: u64 = 5;
}

/// Encode a record, signature included, to canonical bytes.
pub fn encode_record(record: &Record) -> Vec<u8> {
    encode_value(&record_to_value(record, true))
}

/// The bytes a record's signature covers: the encoding without the signature.
pub fn signing_bytes(record: &Record) -> Vec<u8> {
    encode_value(&record_to_value(record, false))
}

/// Decode a record from CBOR bytes, applying the structural checks.
pub fn decode_record(bytes: &[u8]) -> Result<Record, StructuralError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| StructuralError::Undecodable(e.to_string()))?;
    Record::from_value(&value)
}

impl Record {
    /// Convert to the integer-keyed CBOR map that goes on the wire.
    pub fn to_value(&self) -> Value {
        record_to_value(self, true)
    }

    /// Structural check: build a typed record from an untrusted CBOR value.
    ///
    /// Checks, in order: the value is a map, `sequence` is a non-negative
    /// integer, `author` is a well-formed feed id, `content` is a map or a
    /// string. Then the remaining fields must have their wire types.
    pub fn from_value(value: &Value) -> Result<Self, StructuralError> {
        let Value::Map(entries) = value else {
            return Err(StructuralError::NotAnObject);
        };

        let get = |key: u64| -> Option<&Value> {
            entries
                .iter()
                .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
                .map(|(_, v)| v)
        };

        let sequence = match get(keys::SEQUENCE) {
            Some(Value::Integer(i)) => {
                u64::try_from(*i).map_err(|_| StructuralError::InvalidSequence)?
            }
            _ => return Err(StructuralError::InvalidSequence),
        };

        let author = match get(keys::AUTHOR) {
            Some(Value::Text(s)) => s
                .parse::<FeedId>()
                .map_err(|_| StructuralError::InvalidAuthor)?,
            _ => return Err(StructuralError::InvalidAuthor),
        };

        let content = match get(keys::CONTENT) {
            Some(Value::Text(s)) => Content::Opaque(s.clone()),
            Some(Value::Map(fields)) => {
                let mut map = BTreeMap::new();
                for (k, v) in fields {
                    match k {
                        Value::Text(name) => {
                            map.insert(name.clone(), v.clone());
                        }
                        _ => return Err(StructuralError::InvalidContent),
                    }
                }
                Content::Object(map)
            }
            _ => return Err(StructuralError::InvalidContent),
        };

        let previous = match get(keys::PREVIOUS) {
            None | Some(Value::Null) => None,
            Some(Value::Bytes(b)) => Some(
                RecordId::try_from(b.as_slice())
                    .map_err(|_| StructuralError::InvalidField("previous"))?,
            ),
            _ => return Err(StructuralError::InvalidField("previous")),
        };

        let timestamp = match get(keys::TIMESTAMP) {
            Some(Value::Integer(i)) => match i64::try_from(*i) {
                Ok(ms) => Timestamp::Millis(ms),
                Err(_) => Timestamp::Float(i128::from(*i) as f64),
            },
            Some(Value::Float(f)) => Timestamp::Float(*f),
            _ => return Err(StructuralError::InvalidField("timestamp")),
        };

        let signature = match get(keys::SIGNATURE) {
            Some(Value::Bytes(b)) => {
                let arr: [u8; 64] = b
                    .as_slice()
                    .try_into()
                    .map_err(|_| StructuralError::InvalidField("signature"))?;
                Ed25519Signature(arr)
            }
            _ => return Err(StructuralError::InvalidField("signature")),
        };

        Ok(Record {
            previous,
            author,
            sequence,
            timestamp,
            content,
            signature,
        })
    }
}

/// Convert a record to a CBOR Value (map with integer keys).
fn record_to_value(record: &Record, with_signature: bool) -> Value {
    let mut entries = Vec::with_capacity(6);

    let previous = match &record.previous {
        Some(id) => Value::Bytes(id.0.to_vec()),
        None => Value::Null,
    };
    entries.push((Value::Integer(keys::PREVIOUS.into()), previous));
    entries.push((
        Value::Integer(keys::AUTHOR.into()),
        Value::Text(record.author.to_string()),
    ));
    entries.push((
        Value::Integer(keys::SEQUENCE.into()),
        Value::Integer(record.sequence.into()),
    ));
    entries.push((
        Value::Integer(keys::TIMESTAMP.into()),
        match record.timestamp {
            Timestamp::Millis(ms) => Value::Integer(ms.into()),
            Timestamp::Float(f) => Value::Float(f),
        },
    ));

    let content = match &record.content {
        Content::Opaque(s) => Value::Text(s.clone()),
        Content::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (Value::Text(k.clone()), v.clone()))
                .collect(),
        ),
    };
    entries.push((Value::Integer(keys::CONTENT.into()), content));

    if with_signature {
        entries.push((
            Value::Integer(keys::SIGNATURE.into()),
            Value::Bytes(record.signature.0.to_vec()),
        ));
    }

    Value::Map(entries)
}

/// Encode a CBOR Value to canonical bytes.
fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Tag(tag, inner) => {
            encode_uint(buf, 6, *tag);
            encode_value_to(buf, inner);
        }
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(f) => {
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        // Value is non-exhaustive; anything newer encodes as `undefined`.
        _ => buf.push(0xf7),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| (encode_value(k), v))
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::record::RecordBuilder;

    fn sample_record() -> Record {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        RecordBuilder::new(keypair.public_key(), 2)
            .previous(RecordId::from_bytes([0xab; 32]))
            .timestamp(1736870400000)
            .content(
                Content::new("post")
                    .with("text", "hello")
                    .with("likes", 3)
                    .with("ratio", 0.5),
            )
            .sign(&keypair)
    }

    #[test]
    fn test_encoding_deterministic() {
        let record = sample_record();
        assert_eq!(encode_record(&record), encode_record(&record.clone()));
    }

    #[test]
    fn test_signing_bytes_exclude_signature() {
        let mut record = sample_record();
        let before = signing_bytes(&record);
        record.signature = Ed25519Signature::ZERO;
        assert_eq!(before, signing_bytes(&record));
        assert!(encode_record(&record).len() > before.len());
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_integer(&mut buf, Integer::from(-1i64));
        assert_eq!(buf, vec![0x20]);
    }

    #[test]
    fn test_map_key_ordering() {
        // Shorter text keys sort first because the length is in the header byte.
        let mut buf = Vec::new();
        let entries = vec![
            (Value::Text("type".into()), Value::Integer(1.into())),
            (Value::Text("ab".into()), Value::Integer(2.into())),
            (Value::Text("b".into()), Value::Integer(3.into())),
        ];
        encode_map_canonical(&mut buf, &entries);

        assert_eq!(buf[0], 0xa3);
        assert_eq!(&buf[1..3], &[0x61, b'b']);
        assert_eq!(buf[3], 0x03);
        assert_eq!(&buf[4..7], &[0x62, b'a', b'b']);
    }

    #[test]
    fn test_decode_roundtrip() {
        let record = sample_record();
        let decoded = decode_record(&encode_record(&record)).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.compute_id(), record.compute_id());
    }

    #[test]
    fn test_structural_not_an_object() {
        let err = Record::from_value(&Value::Text("hello".into())).unwrap_err();
        assert_eq!(err, StructuralError::NotAnObject);
    }

    fn replace(value: &mut Value, key: u64, new: Value) {
        if let Value::Map(entries) = value {
            for (k, v) in entries.iter_mut() {
                if matches!(k, Value::Integer(i) if i128::from(*i) == key as i128) {
                    *v = new.clone();
                }
            }
        }
    }

    #[test]
    fn test_structural_field_checks() {
        let record = sample_record();

        let mut value = record.to_value();
        replace(&mut value, keys::SEQUENCE, Value::Float(1.5));
        assert_eq!(
            Record::from_value(&value).unwrap_err(),
            StructuralError::InvalidSequence
        );

        let mut value = record.to_value();
        replace(&mut value, keys::SEQUENCE, Value::Integer((-1i64).into()));
        assert_eq!(
            Record::from_value(&value).unwrap_err(),
            StructuralError::InvalidSequence
        );

        let mut value = record.to_value();
        replace(&mut value, keys::AUTHOR, Value::Text("@nope.ed25519".into()));
        assert_eq!(
            Record::from_value(&value).unwrap_err(),
            StructuralError::InvalidAuthor
        );

        let mut value = record.to_value();
        replace(&mut value, keys::CONTENT, Value::Integer(7.into()));
        assert_eq!(
            Record::from_value(&value).unwrap_err(),
            StructuralError::InvalidContent
        );

        let mut value = record.to_value();
        replace(&mut value, keys::SIGNATURE, Value::Bytes(vec![0; 10]));
        assert_eq!(
            Record::from_value(&value).unwrap_err(),
            StructuralError::InvalidField("signature")
        );
    }

    #[test]
    fn test_float_timestamp_accepted() {
        let record = sample_record();
        let mut value = record.to_value();
        replace(&mut value, keys::TIMESTAMP, Value::Float(1000.5));

        let decoded = Record::from_value(&value).unwrap();
        assert_eq!(decoded.timestamp, Timestamp::Float(1000.5));
        // Floats keep the 64-bit form: major type 7, additional info 27.
        let bytes = encode_record(&decoded);
        let needle = [0xfb].iter().chain(&1000.5f64.to_be_bytes()).copied().collect::<Vec<_>>();
        assert!(bytes.windows(9).any(|w| w == needle.as_slice()));

        let mut value = record.to_value();
        replace(&mut value, keys::TIMESTAMP, Value::Text("yesterday".into()));
        assert_eq!(
            Record::from_value(&value).unwrap_err(),
            StructuralError::InvalidField("timestamp")
        );
    }

    #[test]
    fn test_opaque_content_roundtrip() {
        let keypair = Keypair::from_seed(&[0x43; 32]);
        let record = RecordBuilder::new(keypair.public_key(), 1)
            .timestamp(1)
            .content(Content::Opaque("Ym94ZWQ=.box".into()))
            .sign(&keypair);
        let decoded = Record::from_value(&record.to_value()).unwrap();
        assert_eq!(decoded.content, record.content);
    }

    #[test]
    fn test_garbage_bytes_undecodable() {
        let err = decode_record(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, StructuralError::Undecodable(_)));
    }
}
