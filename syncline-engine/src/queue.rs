//! Pending write queue.
//!
//! Writes made while disconnected (or before the engine is ready) land here
//! and are replayed head-to-tail against the remote store once a connection
//! is available. Replay removes an entry only on confirmed success; a
//! failed entry stops the flush so a later write for the same record can
//! never overtake an earlier one. Entries that keep failing past the
//! configured attempt cap are flagged permanently failed and the rest of
//! the queue drains past them.

use crate::error::{SyncError, SyncResult};
use crate::queue_store::QueueStore;
use crate::remote::RemoteWriter;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use syncline_types::{PendingWrite, WriteOp};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Outcome of a flush request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Writes confirmed against the remote store and removed.
    pub replayed: usize,
    /// Writes flagged permanently failed during this flush.
    pub permanently_failed: usize,
    /// Whether the flush stopped early on a retryable failure.
    pub blocked: bool,
    /// Whether this request was coalesced into a flush already running.
    pub coalesced: bool,
}

#[derive(Default)]
struct FlushState {
    running: bool,
    rerun: bool,
}

/// Durable, ordered queue of unconfirmed local writes.
pub struct PendingWriteQueue {
    store: Arc<QueueStore>,
    writer: Arc<dyn RemoteWriter>,
    max_attempts: u32,
    flush_state: Mutex<FlushState>,
    stopped: AtomicBool,
    changed: Notify,
}

impl PendingWriteQueue {
    /// Creates a queue over a durable store and a remote write path.
    pub fn new(store: QueueStore, writer: Arc<dyn RemoteWriter>, max_attempts: u32) -> Self {
        Self {
            store: Arc::new(store),
            writer,
            max_attempts,
            flush_state: Mutex::new(FlushState::default()),
            stopped: AtomicBool::new(false),
            changed: Notify::new(),
        }
    }

    /// Notifier pinged whenever the queue's contents or flush activity
    /// change; the status publisher listens on it.
    pub fn changed(&self) -> &Notify {
        &self.changed
    }

    /// Appends a write to the tail of the queue.
    pub async fn enqueue(&self, write: PendingWrite) -> SyncResult<()> {
        let seq = self.with_store(move |store| store.append(&write)).await?;
        debug!(seq, "queued pending write");
        self.changed.notify_waiters();
        Ok(())
    }

    /// Number of active pending writes.
    pub async fn pending_count(&self) -> SyncResult<usize> {
        self.with_store(|store| store.pending_count()).await
    }

    /// All active pending writes in enqueue order.
    pub async fn pending(&self) -> SyncResult<Vec<PendingWrite>> {
        let rows = self.with_store(|store| store.pending()).await?;
        Ok(rows.into_iter().map(|(_, w)| w).collect())
    }

    /// Writes that exhausted their replay attempts.
    pub async fn failed_writes(&self) -> SyncResult<Vec<PendingWrite>> {
        let rows = self.with_store(|store| store.failed()).await?;
        Ok(rows.into_iter().map(|(_, w)| w).collect())
    }

    /// Whether a flush pass is currently running.
    pub fn flush_in_progress(&self) -> bool {
        self.flush_state.lock().expect("flush state poisoned").running
    }

    /// Timestamp of the newest active pending write for one record.
    pub async fn newest_pending_for(
        &self,
        collection: &str,
        record_id: &str,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        let collection = collection.to_string();
        let record_id = record_id.to_string();
        self.with_store(move |store| store.newest_pending_for(&collection, &record_id))
            .await
    }

    /// Drops pending writes for one record that lost a last-write-wins race
    /// against a remote change observed at `cutoff`.
    pub async fn prune_superseded(
        &self,
        collection: &str,
        record_id: &str,
        cutoff: DateTime<Utc>,
    ) -> SyncResult<usize> {
        let collection = collection.to_string();
        let record_id = record_id.to_string();
        let dropped = self
            .with_store(move |store| store.prune_superseded(&collection, &record_id, cutoff))
            .await?;
        if dropped > 0 {
            info!(dropped, "dropped pending writes superseded by remote change");
            self.changed.notify_waiters();
        }
        Ok(dropped)
    }

    /// Aborts any in-flight flush and refuses new replay work until
    /// `resume` is called. Part of engine shutdown.
    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Re-enables replay after a `cancel`.
    pub fn resume(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Replays the queue head-to-tail against the remote store.
    ///
    /// At most one flush runs at a time; a request made while one is in
    /// progress is coalesced into a single subsequent pass.
    pub async fn flush(&self) -> SyncResult<FlushReport> {
        {
            let mut state = self.flush_state.lock().expect("flush state poisoned");
            if state.running {
                state.rerun = true;
                return Ok(FlushReport {
                    coalesced: true,
                    ..FlushReport::default()
                });
            }
            state.running = true;
        }
        self.changed.notify_waiters();

        let mut report = FlushReport::default();
        loop {
            let outcome = self.flush_pass().await;
            match outcome {
                Ok(pass) => {
                    report.replayed += pass.replayed;
                    report.permanently_failed += pass.permanently_failed;
                    report.blocked = pass.blocked;
                }
                Err(e) => {
                    self.finish_flush();
                    return Err(e);
                }
            }

            let rerun = {
                let mut state = self.flush_state.lock().expect("flush state poisoned");
                if state.rerun && !self.stopped.load(Ordering::SeqCst) {
                    state.rerun = false;
                    true
                } else {
                    state.rerun = false;
                    state.running = false;
                    false
                }
            };
            if !rerun {
                break;
            }
        }
        self.changed.notify_waiters();

        if report.replayed > 0 {
            info!(replayed = report.replayed, "flushed pending writes");
        }
        Ok(report)
    }

    fn finish_flush(&self) {
        let mut state = self.flush_state.lock().expect("flush state poisoned");
        state.running = false;
        state.rerun = false;
        self.changed.notify_waiters();
    }

    async fn flush_pass(&self) -> SyncResult<FlushReport> {
        let mut report = FlushReport::default();
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                debug!("flush cancelled");
                break;
            }
            let Some((seq, write)) = self.with_store(|store| store.head()).await? else {
                break;
            };

            match self.replay(&write).await {
                Ok(()) => {
                    self.with_store(move |store| store.remove(seq)).await?;
                    report.replayed += 1;
                    self.changed.notify_waiters();
                }
                Err(e) => {
                    let attempts = self.with_store(move |store| store.bump_attempts(seq)).await?;
                    if attempts >= self.max_attempts {
                        error!(
                            seq,
                            collection = %write.collection,
                            attempts,
                            error = %e,
                            "pending write exceeded max attempts; marking permanently failed"
                        );
                        self.with_store(move |store| store.mark_failed(seq)).await?;
                        report.permanently_failed += 1;
                        self.changed.notify_waiters();
                        // the rest of the queue keeps draining
                        continue;
                    }
                    warn!(
                        seq,
                        collection = %write.collection,
                        attempts,
                        error = %e,
                        "pending write replay failed; stopping flush to preserve order"
                    );
                    report.blocked = true;
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn replay(&self, write: &PendingWrite) -> SyncResult<()> {
        match write.op {
            WriteOp::Upsert => self.writer.upsert(&write.collection, &write.record).await,
            WriteOp::Delete => {
                let id = write.record_id().ok_or_else(|| {
                    SyncError::Translation("pending delete has no record id".into())
                })?;
                self.writer.delete(&write.collection, id).await
            }
        }
    }

    async fn with_store<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&QueueStore) -> SyncResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| SyncError::Storage(format!("queue store task panicked: {e}")))?
    }
}
