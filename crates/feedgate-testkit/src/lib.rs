//! # feedgate testkit
//!
//! Testing utilities for feedgate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: feed authors that produce valid signed chains
//! - **Generators**: Proptest strategies for property-based testing
//! - **Faulty store**: a [`Store`](feedgate_store::Store) wrapper that counts
//!   calls, injects failures and can hold commits in flight
//!
//! ## Test Fixtures
//!
//! ```rust
//! use feedgate_testkit::fixtures::FeedFixture;
//!
//! let mut feed = FeedFixture::new(7);
//! let genesis = feed.post("ignored for the first record");
//! let second = feed.post("hello");
//! assert_eq!(second.previous, Some(genesis.compute_id()));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use feedgate_testkit::generators::{chain_from_params, ChainParams};
//!
//! proptest! {
//!     #[test]
//!     fn chains_start_with_genesis(params: ChainParams) {
//!         let records = chain_from_params(&params);
//!         prop_assert!(records[0].is_init());
//!     }
//! }
//! ```

pub mod faulty;
pub mod fixtures;
pub mod generators;

pub use faulty::FaultyStore;
pub use fixtures::{multi_feed_fixtures, FeedFixture};
pub use generators::{chain_from_params, ChainParams};
