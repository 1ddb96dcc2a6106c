//! Change routing.
//!
//! Single entry point for every incoming remote or peer change: translate
//! it into a local-cache write under the echo guard, notify local
//! listeners, and rebroadcast remote-origin events to sibling instances.
//!
//! Applying the same event twice leaves the cache in the same state as
//! applying it once: upserts and deletes are keyed by record id, and no
//! step depends on arrival count.

use crate::bus::{PeerBus, PeerMessage, PeerPayload};
use crate::cache::LocalCache;
use crate::error::{SyncError, SyncResult};
use crate::queue::PendingWriteQueue;
use std::sync::Arc;
use syncline_types::{ChangeEvent, ChangeOp, InstanceId, Origin};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered capacity for the local data-change channel.
const DATA_CHANNEL_CAPACITY: usize = 128;

/// Applies incoming change events to the local cache and fans them out.
pub struct ChangeRouter {
    cache: Arc<dyn LocalCache>,
    bus: Arc<dyn PeerBus>,
    queue: Arc<PendingWriteQueue>,
    instance: InstanceId,
    data_tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeRouter {
    /// Creates a router writing through `cache`, rebroadcasting via `bus`,
    /// and consulting `queue` for last-write-wins conflict checks.
    pub fn new(
        cache: Arc<dyn LocalCache>,
        bus: Arc<dyn PeerBus>,
        queue: Arc<PendingWriteQueue>,
        instance: InstanceId,
    ) -> Self {
        let (data_tx, _) = broadcast::channel(DATA_CHANNEL_CAPACITY);
        Self {
            cache,
            bus,
            queue,
            instance,
            data_tx,
        }
    }

    /// Subscribes to locally applied changes. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.data_tx.subscribe()
    }

    /// Applies one incoming change event.
    ///
    /// Only `Remote` and `Peer` origins route through here; the
    /// application's own write path talks to the cache directly.
    pub async fn apply(&self, event: ChangeEvent) -> SyncResult<()> {
        if event.origin == Origin::Local {
            return Err(SyncError::Translation(
                "local writes do not route through the change router".into(),
            ));
        }
        let Some(record_id) = event.record_id().map(str::to_string) else {
            return Err(SyncError::Translation(format!(
                "{:?} event for '{}' carries no record id",
                event.op, event.collection
            )));
        };

        // Last-write-wins against unflushed local edits for the same record:
        // a strictly newer pending write survives and the remote change is
        // skipped; older pending writes are dropped as superseded.
        if let Some(pending_at) = self
            .queue
            .newest_pending_for(&event.collection, &record_id)
            .await?
        {
            if pending_at > event.observed_at {
                debug!(
                    collection = %event.collection,
                    record = %record_id,
                    "skipping remote change older than local pending write"
                );
                return Ok(());
            }
            self.queue
                .prune_superseded(&event.collection, &record_id, event.observed_at)
                .await?;
        }

        match event.op {
            ChangeOp::Insert | ChangeOp::Update => {
                let record = event.new_record.clone().ok_or_else(|| {
                    SyncError::Translation(format!(
                        "{:?} event for '{}' carries no record",
                        event.op, event.collection
                    ))
                })?;
                self.cache.put(&event.collection, record, true).await?;
            }
            ChangeOp::Delete => {
                self.cache.delete(&event.collection, &record_id, true).await?;
            }
        }
        debug!(
            collection = %event.collection,
            record = %record_id,
            op = ?event.op,
            origin = ?event.origin,
            "applied change"
        );

        // notify local listeners after the write lands
        let _ = self.data_tx.send(event.clone());

        // only remote-origin events fan out; a peer event stops here, which
        // is what keeps relay loops impossible
        if event.origin == Origin::Remote {
            self.bus.publish(PeerMessage {
                sender: self.instance,
                payload: PeerPayload::Change(event.with_origin(Origin::Peer)),
            });
        }
        Ok(())
    }
}
