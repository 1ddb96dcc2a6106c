//! Sync status publishing.
//!
//! Folds connection health, queue depth, and flush activity into the one
//! status the rest of the application displays, and announces every
//! transition both to local listeners and over the cross-instance bus so
//! sibling instances converge on a shared status without each probing the
//! endpoint.

use crate::bus::{PeerBus, PeerMessage, PeerPayload};
use crate::monitor::{ConnectionMonitor, ConnectionState};
use crate::queue::PendingWriteQueue;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use syncline_types::InstanceId;
use tokio::sync::broadcast;
use tracing::info;

/// Buffered capacity for the local status channel.
const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Engine health as displayed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Connected with nothing left to replay.
    Connected,
    /// Connected and draining queued writes.
    Syncing,
    /// Connection is flapping; data may be stale.
    Degraded,
    /// No connection; recovery continues in the background.
    Offline,
    /// Reconnects exhausted and the endpoint explicitly rejected the last
    /// health check; operator attention is likely needed.
    Error,
}

/// Computes and publishes the engine's displayed status.
pub struct StatusPublisher {
    monitor: Arc<ConnectionMonitor>,
    queue: Arc<PendingWriteQueue>,
    bus: Arc<dyn PeerBus>,
    instance: InstanceId,
    tx: broadcast::Sender<SyncStatus>,
    current: Mutex<SyncStatus>,
}

impl StatusPublisher {
    /// Creates a publisher reporting `Offline` until the first refresh.
    pub fn new(
        monitor: Arc<ConnectionMonitor>,
        queue: Arc<PendingWriteQueue>,
        bus: Arc<dyn PeerBus>,
        instance: InstanceId,
    ) -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            monitor,
            queue,
            bus,
            instance,
            tx,
            current: Mutex::new(SyncStatus::Offline),
        }
    }

    /// The currently displayed status.
    pub fn current(&self) -> SyncStatus {
        *self.current.lock().expect("status lock poisoned")
    }

    /// Subscribes to status transitions. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Recomputes the status and publishes it if it changed.
    pub async fn refresh(&self) {
        let status = self.compute().await;
        self.publish(status, true);
    }

    /// Adopts a status announced by a sibling instance. Not re-announced,
    /// so status messages never bounce between instances.
    pub fn note_peer_status(&self, status: SyncStatus) {
        self.publish(status, false);
    }

    /// Reports `Offline` locally without announcing it, for engine
    /// shutdown (a stopping instance must not drag healthy siblings'
    /// displayed status down with it).
    pub fn mark_offline(&self) {
        self.publish(SyncStatus::Offline, false);
    }

    async fn compute(&self) -> SyncStatus {
        let pending = self.queue.pending_count().await.unwrap_or(0);
        let flushing = self.queue.flush_in_progress();
        match self.monitor.state() {
            ConnectionState::Connected => {
                if pending > 0 || flushing {
                    SyncStatus::Syncing
                } else {
                    SyncStatus::Connected
                }
            }
            ConnectionState::Degraded => SyncStatus::Degraded,
            ConnectionState::Offline => {
                if pending == 0 && self.monitor.last_check_rejected() {
                    SyncStatus::Error
                } else {
                    SyncStatus::Offline
                }
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => SyncStatus::Offline,
        }
    }

    fn publish(&self, status: SyncStatus, announce: bool) {
        {
            let mut current = self.current.lock().expect("status lock poisoned");
            if *current == status {
                return;
            }
            *current = status;
        }
        info!(status = ?status, "sync status changed");
        let _ = self.tx.send(status);
        if announce {
            self.bus.publish(PeerMessage {
                sender: self.instance,
                payload: PeerPayload::Status(status),
            });
        }
    }
}
