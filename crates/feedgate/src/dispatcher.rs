//! The dispatcher: a single task that owns the validation queue, the
//! latest-state cache and the batch writer.
//!
//! All mutation of that state happens on this task. Handles send it
//! [`Command`]s; the store calls it spawns (hydration, commits) report back as
//! [`Event`]s. Only the head of the global queue is ever inspected, so records
//! are decided strictly in arrival order across all feeds.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use feedgate_core::{validate_record, Ed25519PublicKey, FeedId, Record, RecordId, RejectReason};
use feedgate_store::{Store, StoreError};

use crate::cache::{self, FeedHead, Hydration, LatestCache, LatestSnapshot};
use crate::error::{Result, ValidateError};
use crate::validator::Accepted;
use crate::writer::{BatchWriter, PendingWrite};

/// Where a submitter's outcome is delivered.
pub(crate) type Completion = oneshot::Sender<Result<Accepted>>;

/// Requests from [`FeedValidator`](crate::FeedValidator) handles.
pub(crate) enum Command {
    Validate {
        key: RecordId,
        record: Record,
        completion: Completion,
    },
    GetLatest {
        feed: FeedId,
        reply: oneshot::Sender<LatestSnapshot>,
    },
}

/// Results of store calls the dispatcher started.
enum Event {
    Hydrated {
        feed: FeedId,
        head: FeedHead,
    },
    Committed {
        result: std::result::Result<(), StoreError>,
    },
}

struct QueueItem {
    key: RecordId,
    record: Record,
    completion: Completion,
}

/// What to do with the record at the head of the queue.
enum Decision {
    Accept(Ed25519PublicKey),
    Reject(RejectReason),
    Duplicate,
}

pub(crate) struct Dispatcher<S: Store + 'static> {
    store: Arc<S>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    queue: VecDeque<QueueItem>,
    cache: LatestCache,
    writer: BatchWriter,
    /// Bound on queued plus pending-write records before commands stop being read.
    capacity: usize,
}

impl<S: Store + 'static> Dispatcher<S> {
    pub fn new(
        store: Arc<S>,
        commands: mpsc::Receiver<Command>,
        capacity: usize,
        max_batch_size: usize,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            store,
            commands,
            events_tx,
            events,
            queue: VecDeque::new(),
            cache: LatestCache::new(),
            writer: BatchWriter::new(max_batch_size),
            capacity: capacity.max(1),
        }
    }

    /// Run until every handle is dropped and all admitted work has finished.
    pub async fn run(mut self) {
        let mut open = true;
        loop {
            tokio::select! {
                command = self.commands.recv(), if open && self.has_room() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(queued = self.queue.len(), "all handles dropped, finishing queued work");
                        open = false;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event),
            }

            self.drain();

            if !open && self.is_idle() {
                break;
            }
        }
        debug!("dispatcher stopped");
    }

    /// While full, submitters wait on the bounded command channel.
    fn has_room(&self) -> bool {
        self.queue.len() + self.writer.pending_len() < self.capacity
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.writer.is_idle() && self.cache.loading() == 0
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Validate {
                key,
                record,
                completion,
            } => {
                trace!(feed = %record.author, seq = record.sequence, "record queued");
                self.queue.push_back(QueueItem {
                    key,
                    record,
                    completion,
                });
            }
            Command::GetLatest { feed, reply } => match self.cache.state(&feed) {
                Hydration::Ready(head) => {
                    let _ = reply.send(head.snapshot());
                }
                Hydration::Loading | Hydration::Unloaded => {
                    self.start_hydration(feed);
                    if let Err(reply) = self.cache.park(&feed, reply) {
                        // Only reachable if the entry is not loading after
                        // start_hydration, which cannot happen.
                        let _ = reply.send(FeedHead::default().snapshot());
                    }
                }
            },
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Hydrated { feed, head } => {
                let snapshot = head.snapshot();
                for waiter in self.cache.complete(feed, head) {
                    let _ = waiter.send(snapshot.clone());
                }
            }
            Event::Committed { result } => {
                let batch = self.writer.finish();
                match result {
                    Ok(()) => {
                        debug!(records = batch.len(), "batch committed");
                        self.flush();
                        for write in batch {
                            write.succeed();
                        }
                    }
                    Err(e) => {
                        error!(error = %e, records = batch.len(), "batch commit failed");
                        let feeds: HashSet<FeedId> =
                            batch.iter().map(|w| w.record.author).collect();
                        for feed in &feeds {
                            self.cache.evict(feed);
                        }
                        // Later writes of these feeds chain onto records that
                        // never reached the store.
                        let orphaned = self.writer.take_feeds(&feeds);
                        let message = e.to_string();
                        for write in batch.into_iter().chain(orphaned) {
                            write.fail(&message);
                        }
                        self.flush();
                    }
                }
            }
        }
    }

    fn start_hydration(&mut self, feed: FeedId) {
        if !self.cache.begin_loading(feed) {
            return;
        }
        trace!(%feed, "hydrating feed");
        let store = Arc::clone(&self.store);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let head = cache::hydrate(store.as_ref(), &feed).await;
            let _ = events.send(Event::Hydrated { feed, head });
        });
    }

    /// Decide queued records until the head waits on a hydration.
    fn drain(&mut self) {
        while let Some(head) = self.queue.front() {
            let feed = head.record.author;
            match self.cache.state(&feed) {
                Hydration::Unloaded => {
                    self.start_hydration(feed);
                    break;
                }
                Hydration::Loading => break,
                Hydration::Ready(_) => {}
            }
            if let Some(item) = self.queue.pop_front() {
                self.decide(item);
            }
        }
        self.flush();
    }

    fn decide(&mut self, item: QueueItem) {
        let QueueItem {
            key,
            record,
            completion,
        } = item;
        let feed = record.author;

        let Hydration::Ready(head) = self.cache.state(&feed) else {
            // The head was checked ready before dequeueing.
            self.queue.push_front(QueueItem {
                key,
                record,
                completion,
            });
            return;
        };

        match judge(head, &record) {
            Decision::Accept(public_key) => {
                debug!(%feed, seq = record.sequence, %key, "record accepted");
                self.cache.advance(feed, key, record.clone(), public_key);
                self.writer
                    .submit(PendingWrite::new(key, record, completion));
            }
            Decision::Reject(reason) => {
                debug!(%feed, seq = record.sequence, %reason, "record rejected");
                let _ = completion.send(Err(ValidateError::Rejected(reason)));
            }
            Decision::Duplicate => {
                debug!(%feed, seq = record.sequence, %key, "duplicate record");
                if let Err(completion) = self.writer.attach(&key, completion) {
                    self.resolve_duplicate(key, record.sequence, completion);
                }
            }
        }
    }

    /// Answer a resubmission from the store without holding up the queue.
    fn resolve_duplicate(&self, key: RecordId, sequence: u64, completion: Completion) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let outcome = match store.get(&key).await {
                Ok(Some(record)) => Ok(Accepted { key, record }),
                Ok(None) => Err(ValidateError::Conflict { sequence }),
                Err(e) => Err(ValidateError::Store(e)),
            };
            let _ = completion.send(outcome);
        });
    }

    fn flush(&mut self) {
        let Some(batch) = self.writer.begin_flush() else {
            return;
        };
        trace!(records = batch.len(), "flushing batch");
        let store = Arc::clone(&self.store);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = store.commit_batch(&batch).await;
            let _ = events.send(Event::Committed { result });
        });
    }
}

/// Decide a record against its feed's head.
fn judge(head: &FeedHead, record: &Record) -> Decision {
    let Some(latest) = head.record.as_ref() else {
        return match record.content.declared_key() {
            Some(declared) => match validate_record(record, None, &declared) {
                Ok(()) => Decision::Accept(declared),
                Err(reason) => Decision::Reject(reason),
            },
            None if record.sequence > 1 => Decision::Reject(RejectReason::SequenceTooHigh {
                expected: 1,
                got: record.sequence,
            }),
            None => Decision::Reject(RejectReason::MissingFeedKey),
        };
    };

    if record.sequence <= latest.sequence {
        return Decision::Duplicate;
    }

    if Some(record.sequence) == latest.sequence.checked_add(1) {
        let Some(public_key) = head.public_key else {
            return Decision::Reject(RejectReason::MissingFeedKey);
        };
        return match validate_record(record, Some(latest), &public_key) {
            Ok(()) => Decision::Accept(public_key),
            Err(reason) => Decision::Reject(reason),
        };
    }

    Decision::Reject(RejectReason::SequenceTooHigh {
        expected: latest.sequence + 1,
        got: record.sequence,
    })
}
