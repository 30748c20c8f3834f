//! Batch write coalescer.
//!
//! Accepted records wait in a pending list while at most one batch is being
//! committed. When the commit finishes, whatever accumulated meanwhile goes
//! out as the next batch, so many records share one durable write.

use std::collections::HashSet;

use feedgate_core::{FeedId, Record, RecordId};
use feedgate_store::StoredRecord;

use crate::dispatcher::Completion;
use crate::error::ValidateError;
use crate::validator::Accepted;

/// An accepted record waiting to be made durable.
pub(crate) struct PendingWrite {
    pub key: RecordId,
    pub record: Record,
    /// The submitter plus any duplicates attached while the write was pending.
    pub completions: Vec<Completion>,
}

impl PendingWrite {
    pub fn new(key: RecordId, record: Record, completion: Completion) -> Self {
        Self {
            key,
            record,
            completions: vec![completion],
        }
    }

    pub fn succeed(self) {
        let accepted = Accepted {
            key: self.key,
            record: self.record,
        };
        for completion in self.completions {
            let _ = completion.send(Ok(accepted.clone()));
        }
    }

    pub fn fail(self, message: &str) {
        for completion in self.completions {
            let _ = completion.send(Err(ValidateError::CommitFailed(message.to_string())));
        }
    }
}

pub(crate) struct BatchWriter {
    pending: Vec<PendingWrite>,
    in_flight: Option<Vec<PendingWrite>>,
    max_batch_size: usize,
}

impl BatchWriter {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            pending: Vec::new(),
            in_flight: None,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn submit(&mut self, write: PendingWrite) {
        self.pending.push(write);
    }

    /// Attach a duplicate's completion to a write that has not committed yet.
    ///
    /// Hands the completion back if no pending or in-flight write has `key`.
    pub fn attach(&mut self, key: &RecordId, completion: Completion) -> Result<(), Completion> {
        let in_flight = self.in_flight.iter_mut().flatten();
        match in_flight.chain(self.pending.iter_mut()).find(|w| w.key == *key) {
            Some(write) => {
                write.completions.push(completion);
                Ok(())
            }
            None => Err(completion),
        }
    }

    /// Start a batch if none is in flight and writes are pending.
    ///
    /// Returns the records to commit.
    pub fn begin_flush(&mut self) -> Option<Vec<StoredRecord>> {
        if self.in_flight.is_some() || self.pending.is_empty() {
            return None;
        }
        let take = self.pending.len().min(self.max_batch_size);
        let batch: Vec<PendingWrite> = self.pending.drain(..take).collect();
        let records = batch
            .iter()
            .map(|w| StoredRecord {
                key: w.key,
                record: w.record.clone(),
            })
            .collect();
        self.in_flight = Some(batch);
        Some(records)
    }

    /// Take the in-flight batch once its commit has resolved.
    pub fn finish(&mut self) -> Vec<PendingWrite> {
        self.in_flight.take().unwrap_or_default()
    }

    /// Remove pending writes authored by any of `feeds`, preserving order.
    pub fn take_feeds(&mut self, feeds: &HashSet<FeedId>) -> Vec<PendingWrite> {
        let (taken, kept) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|w| feeds.contains(&w.record.author));
        self.pending = kept;
        taken
    }

    /// Accepted writes not yet handed to the store.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgate_core::{Content, Keypair, RecordBuilder};
    use tokio::sync::oneshot;

    fn write(seed: u8, seq: u64) -> (PendingWrite, oneshot::Receiver<crate::error::Result<Accepted>>) {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let record = RecordBuilder::new(keypair.public_key(), seq)
            .timestamp(seq as i64)
            .content(Content::new("post"))
            .sign(&keypair);
        let (tx, rx) = oneshot::channel();
        (PendingWrite::new(record.compute_id(), record, tx), rx)
    }

    #[test]
    fn test_single_batch_in_flight() {
        let mut writer = BatchWriter::new(10);
        assert!(writer.begin_flush().is_none());

        writer.submit(write(1, 1).0);
        writer.submit(write(1, 2).0);
        let batch = writer.begin_flush().unwrap();
        assert_eq!(batch.len(), 2);

        writer.submit(write(1, 3).0);
        assert!(writer.begin_flush().is_none());
        assert!(!writer.is_idle());

        assert_eq!(writer.finish().len(), 2);
        let next = writer.begin_flush().unwrap();
        assert_eq!(next[0].record.sequence, 3);
        writer.finish();
        assert!(writer.is_idle());
    }

    #[test]
    fn test_batch_size_limit() {
        let mut writer = BatchWriter::new(2);
        for seq in 1..=5 {
            writer.submit(write(2, seq).0);
        }
        let first = writer.begin_flush().unwrap();
        let seqs: Vec<_> = first.iter().map(|s| s.record.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        writer.finish();
        assert_eq!(writer.begin_flush().unwrap().len(), 2);
        writer.finish();
        assert_eq!(writer.begin_flush().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attach_to_pending_and_in_flight() {
        let mut writer = BatchWriter::new(1);
        let (first, first_rx) = write(3, 1);
        let (second, _second_rx) = write(3, 2);
        let first_key = first.key;
        let second_key = second.key;
        writer.submit(first);
        writer.submit(second);
        writer.begin_flush();

        let (dup_tx, dup_rx) = oneshot::channel();
        assert!(writer.attach(&first_key, dup_tx).is_ok());
        let (dup2_tx, _dup2_rx) = oneshot::channel();
        assert!(writer.attach(&second_key, dup2_tx).is_ok());
        let (stray_tx, _stray_rx) = oneshot::channel();
        assert!(writer.attach(&RecordId::from_bytes([0; 32]), stray_tx).is_err());

        for w in writer.finish() {
            w.succeed();
        }
        let original = first_rx.await.unwrap().unwrap();
        let duplicate = dup_rx.await.unwrap().unwrap();
        assert_eq!(original, duplicate);
        assert_eq!(duplicate.key, first_key);
    }

    #[tokio::test]
    async fn test_take_feeds_and_fail() {
        let mut writer = BatchWriter::new(10);
        let (a1, a1_rx) = write(4, 1);
        let (b1, _) = write(5, 1);
        let (a2, _) = write(4, 2);
        let feed_a = a1.record.author;
        writer.submit(a1);
        writer.submit(b1);
        writer.submit(a2);

        let taken = writer.take_feeds(&HashSet::from([feed_a]));
        let seqs: Vec<_> = taken.iter().map(|w| w.record.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(writer.begin_flush().unwrap().len(), 1);

        for w in taken {
            w.fail("disk full");
        }
        assert!(matches!(
            a1_rx.await.unwrap(),
            Err(ValidateError::CommitFailed(msg)) if msg == "disk full"
        ));
    }
}
