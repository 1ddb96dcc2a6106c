//! Change events delivered by the remote feed.
//!
//! A `ChangeEvent` is a single notified mutation (insert/update/delete) for
//! a record in a tracked collection. Events are transient: produced by the
//! feed (or re-delivered by a sibling instance), applied to the local cache,
//! and discarded.
//!
//! Constructors enforce the structural invariants: a delete carries no new
//! record, an insert carries no old record.

use crate::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOp {
    /// A record was created.
    Insert,
    /// A record was modified.
    Update,
    /// A record was removed.
    Delete,
}

/// Where an event entered this instance.
///
/// The origin tag is the echo guard: `Remote` and `Peer` events are applied
/// with upstream propagation suppressed, and only `Remote` events are
/// rebroadcast to sibling instances. A `Peer` event is never rebroadcast,
/// which is what keeps relay loops structurally impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Delivered by the remote change feed.
    Remote,
    /// Produced by this application's own write path.
    Local,
    /// Re-delivered by a sibling instance over the coordination bus.
    Peer,
}

/// A single notified mutation for a record in a tracked collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The collection the record belongs to.
    pub collection: String,

    /// The kind of mutation.
    pub op: ChangeOp,

    /// The record after the mutation. `None` for deletes.
    pub new_record: Option<Record>,

    /// The record before the mutation. `None` for inserts, and for feeds
    /// that do not replay prior state.
    pub old_record: Option<Record>,

    /// Where this event entered the current instance.
    pub origin: Origin,

    /// When the mutation was observed by the feed.
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an insert event.
    #[must_use]
    pub fn insert(collection: impl Into<String>, record: Record, origin: Origin) -> Self {
        Self {
            collection: collection.into(),
            op: ChangeOp::Insert,
            new_record: Some(record),
            old_record: None,
            origin,
            observed_at: Utc::now(),
        }
    }

    /// Creates an update event.
    #[must_use]
    pub fn update(
        collection: impl Into<String>,
        record: Record,
        old_record: Option<Record>,
        origin: Origin,
    ) -> Self {
        Self {
            collection: collection.into(),
            op: ChangeOp::Update,
            new_record: Some(record),
            old_record,
            origin,
            observed_at: Utc::now(),
        }
    }

    /// Creates a delete event.
    #[must_use]
    pub fn delete(collection: impl Into<String>, old_record: Record, origin: Origin) -> Self {
        Self {
            collection: collection.into(),
            op: ChangeOp::Delete,
            new_record: None,
            old_record: Some(old_record),
            origin,
            observed_at: Utc::now(),
        }
    }

    /// Returns the same event with a different origin tag.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Returns the same event with an explicit observation timestamp.
    #[must_use]
    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Returns the stable id of the record this event targets.
    ///
    /// Inserts and updates key off the new record; deletes key off the old
    /// one. `None` means the event cannot be translated into a cache write.
    pub fn record_id(&self) -> Option<&str> {
        match self.op {
            ChangeOp::Insert | ChangeOp::Update => self.new_record.as_ref()?.id(),
            ChangeOp::Delete => self.old_record.as_ref()?.id(),
        }
    }
}
