//! Pending writes.
//!
//! A pending write is a local mutation that could not be confirmed against
//! the remote store, held durably until successfully replayed. Pending
//! writes are the only Syncline state that survives a process restart.

use crate::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of write to replay against the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert-or-update by record id.
    Upsert,
    /// Remove by record id.
    Delete,
}

/// A local mutation awaiting replay against the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// The collection the write targets.
    pub collection: String,

    /// The kind of write.
    pub op: WriteOp,

    /// The record payload. For deletes only the `id` field is consulted.
    pub record: Record,

    /// When the write was queued.
    pub enqueued_at: DateTime<Utc>,

    /// How many replay attempts have failed so far.
    pub attempts: u32,
}

impl PendingWrite {
    /// Creates an upsert write queued now.
    #[must_use]
    pub fn upsert(collection: impl Into<String>, record: Record) -> Self {
        Self {
            collection: collection.into(),
            op: WriteOp::Upsert,
            record,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Creates a delete write queued now.
    #[must_use]
    pub fn delete(collection: impl Into<String>, record: Record) -> Self {
        Self {
            collection: collection.into(),
            op: WriteOp::Delete,
            record,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Returns the stable id of the record this write targets.
    pub fn record_id(&self) -> Option<&str> {
        self.record.id()
    }
}
