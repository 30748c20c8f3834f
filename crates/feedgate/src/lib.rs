//! # feedgate
//!
//! The acceptance gate for per-identity append-only feeds. Every incoming
//! record must prove that it is a correctly ordered, signed continuation of
//! its feed before it is durably stored.
//!
//! ## Overview
//!
//! - **Validation**: each record is checked against its feed's latest record
//!   (size, content type, hash link, ordering, author, signature)
//! - **Serialization**: one global queue decides records strictly in arrival
//!   order, across all feeds
//! - **Hydration**: a feed's latest record is loaded from the store once, on
//!   first reference
//! - **Batching**: accepted records are coalesced into atomic batch commits
//!
//! ## Usage
//!
//! ```rust,no_run
//! use feedgate::{FeedValidator, ValidatorConfig};
//! use feedgate::core::{Content, FeedId, Keypair, RecordBuilder};
//! use feedgate::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("feeds.db").unwrap();
//!     let validator = FeedValidator::new(store, ValidatorConfig::default());
//!
//!     let keypair = Keypair::generate();
//!     let genesis = RecordBuilder::new(keypair.public_key(), 1)
//!         .timestamp(1_700_000_000_000)
//!         .content(Content::init(&keypair.public_key()))
//!         .sign(&keypair);
//!
//!     let accepted = validator.validate(genesis).await.unwrap();
//!     let latest = validator
//!         .get_latest(&FeedId::Key(keypair.public_key()))
//!         .await
//!         .unwrap();
//!     assert_eq!(latest.key, Some(accepted.key));
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `feedgate::core` - Records, feed ids, canonical encoding, validation rules
//! - `feedgate::store` - Storage abstraction, SQLite and in-memory stores

pub mod cache;
mod dispatcher;
pub mod error;
pub mod validator;
mod writer;

pub use feedgate_core as core;
pub use feedgate_store as store;

pub use cache::{FeedHead, LatestSnapshot, OpKind};
pub use error::{Result, ValidateError};
pub use validator::{Accepted, FeedValidator, Pending, ValidatorConfig};

pub use feedgate_core::{
    Content, Ed25519PublicKey, FeedId, Keypair, Record, RecordBuilder, RecordId, RejectReason,
    StructuralError, Value,
};
