//! # feedgate store
//!
//! Storage abstraction for feedgate. Provides a trait-based interface for
//! persisting accepted records, with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The validator only talks to storage through the [`Store`] trait. The
//! primary implementation is [`SqliteStore`], with [`MemoryStore`] for tests.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`StoredRecord`] - A record paired with its key
//! - [`LogEntry`] - A record at a position in the commit log
//!
//! ## Usage
//!
//! ```rust,no_run
//! use feedgate_store::{SqliteStore, Store};
//! use feedgate_core::FeedId;
//!
//! async fn example(feed: FeedId) {
//!     let store = SqliteStore::open("feeds.db").unwrap();
//!
//!     if let Some(latest) = store.get_latest(&feed).await.unwrap() {
//!         println!("{} is at seq {}", feed, latest.record.sequence);
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic batches**: a batch is committed entirely or not at all
//! - **Idempotent commits**: re-committing a stored record is a no-op
//! - **Conflict detection**: a different record at an occupied feed position
//!   fails the batch

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{LogEntry, Store, StoredRecord};
