//! The FeedValidator: entry point for submitting records.
//!
//! A `FeedValidator` is a cheap, cloneable handle to a dispatcher task. Every
//! clone feeds the same global queue, so decisions stay in arrival order no
//! matter which handle a record came through.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use feedgate_core::{FeedId, Record, RecordId, Value};
use feedgate_store::Store;

use crate::cache::LatestSnapshot;
use crate::dispatcher::{Command, Dispatcher};
use crate::error::{Result, ValidateError};

/// Configuration for the validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Records the validator holds (queued or waiting for a commit) before it
    /// stops reading commands. Submitters wait once the command channel, of
    /// the same capacity, is full as well.
    pub queue_capacity: usize,
    /// Maximum number of records committed in one batch.
    pub max_batch_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_batch_size: 256,
        }
    }
}

/// A record that is (or already was) part of its feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accepted {
    pub key: RecordId,
    pub record: Record,
}

/// Outcome of a submitted record, resolved once it is decided and, if
/// accepted, committed.
#[must_use = "a submitted record's outcome is only observed by awaiting it"]
pub struct Pending {
    rx: oneshot::Receiver<Result<Accepted>>,
}

impl Future for Pending {
    type Output = Result<Accepted>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|_| Err(ValidateError::Closed)))
    }
}

/// Handle to a running validator.
///
/// Must be created inside a tokio runtime. The dispatcher task stops once
/// every handle is dropped and all queued and in-flight work has finished.
pub struct FeedValidator<S: Store + 'static> {
    commands: mpsc::Sender<Command>,
    store: Arc<S>,
}

impl<S: Store + 'static> Clone for FeedValidator<S> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store + 'static> FeedValidator<S> {
    /// Start a validator over `store`.
    pub fn new(store: S, config: ValidatorConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Start a validator over a store that is also used elsewhere.
    pub fn with_shared_store(store: Arc<S>, config: ValidatorConfig) -> Self {
        let (commands, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            rx,
            config.queue_capacity,
            config.max_batch_size,
        );
        tokio::spawn(dispatcher.run());
        Self { commands, store }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue a record and return its pending outcome.
    ///
    /// Waits only for room in the queue, so callers can pipeline many records.
    pub async fn submit(&self, record: Record) -> Pending {
        let (completion, rx) = oneshot::channel();
        let command = Command::Validate {
            key: record.compute_id(),
            record,
            completion,
        };
        // A closed channel drops the completion, which resolves as Closed.
        let _ = self.commands.send(command).await;
        Pending { rx }
    }

    /// Validate a record and wait for the outcome.
    pub async fn validate(&self, record: Record) -> Result<Accepted> {
        self.submit(record).await.await
    }

    /// Check an untrusted record structurally, then queue it.
    ///
    /// Malformed input is rejected here and never reaches the queue.
    pub async fn submit_value(&self, value: &Value) -> Result<Pending> {
        let record = Record::from_value(value)?;
        Ok(self.submit(record).await)
    }

    /// Check an untrusted record structurally, then validate it.
    pub async fn validate_value(&self, value: &Value) -> Result<Accepted> {
        self.submit_value(value).await?.await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The latest accepted record of a feed, hydrating it if needed.
    pub async fn get_latest(&self, feed: &FeedId) -> Result<LatestSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::GetLatest { feed: *feed, reply })
            .await
            .map_err(|_| ValidateError::Closed)?;
        rx.await.map_err(|_| ValidateError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgate_core::{Content, Keypair, RecordBuilder, StructuralError};
    use feedgate_store::MemoryStore;

    #[test]
    fn test_default_config() {
        let config = ValidatorConfig::default();
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.max_batch_size, 256);
    }

    #[tokio::test]
    async fn test_genesis_round_trip() {
        let validator = FeedValidator::new(MemoryStore::new(), ValidatorConfig::default());
        let keypair = Keypair::from_seed(&[1; 32]);
        let record = RecordBuilder::new(keypair.public_key(), 1)
            .timestamp(1000)
            .content(Content::init(&keypair.public_key()))
            .sign(&keypair);

        let accepted = validator.validate(record.clone()).await.unwrap();
        assert_eq!(accepted.key, record.compute_id());

        let latest = validator
            .get_latest(&FeedId::Key(keypair.public_key()))
            .await
            .unwrap();
        assert_eq!(latest.value, Some(record));
        assert_eq!(latest.public, Some(keypair.public_key()));
    }

    #[tokio::test]
    async fn test_structural_rejection_is_immediate() {
        let validator = FeedValidator::new(MemoryStore::new(), ValidatorConfig::default());
        let result = validator
            .validate_value(&Value::Text("not a record".into()))
            .await;
        assert!(matches!(
            result,
            Err(ValidateError::Structural(StructuralError::NotAnObject))
        ));
    }
}
