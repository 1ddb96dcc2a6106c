//! Cross-instance coordination bus.
//!
//! Concurrently open instances of the application (tabs, windows, worker
//! processes on one host) coordinate through this bus so a remote change
//! received by one instance is applied once, locally, everywhere. Delivery
//! is at-most-once per subscriber per message and best-effort between
//! instances: an instance that misses a broadcast converges later through
//! its own feed.

use crate::status::SyncStatus;
use syncline_types::{ChangeEvent, InstanceId};
use tokio::sync::broadcast;

/// Default buffered capacity for the in-process bus.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// What a peer message carries.
#[derive(Debug, Clone)]
pub enum PeerPayload {
    /// A change event re-delivered by a sibling instance. Origin is always
    /// `Peer` by the time it is on the bus.
    Change(ChangeEvent),
    /// A sync status announcement, letting instances converge on one
    /// displayed status without each health-checking the endpoint.
    Status(SyncStatus),
}

/// A message exchanged between instances.
#[derive(Debug, Clone)]
pub struct PeerMessage {
    /// The instance that published the message. Instances skip their own.
    pub sender: InstanceId,
    /// The payload.
    pub payload: PeerPayload,
}

/// A local process-group message bus.
pub trait PeerBus: Send + Sync {
    /// Publishes a message to all current subscribers. Best-effort: having
    /// no subscribers is not an error.
    fn publish(&self, message: PeerMessage);

    /// Subscribes to messages published after this call.
    fn subscribe(&self) -> broadcast::Receiver<PeerMessage>;
}

/// In-process bus over a tokio broadcast channel.
///
/// Clone the bus (or share an `Arc`) into every engine instance that should
/// coordinate within this process.
#[derive(Clone)]
pub struct InProcessBus {
    tx: broadcast::Sender<PeerMessage>,
}

impl InProcessBus {
    /// Creates a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` undelivered messages per
    /// subscriber. A subscriber that lags past the buffer misses the
    /// overwritten messages, which the sync model tolerates.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerBus for InProcessBus {
    fn publish(&self, message: PeerMessage) {
        // send only errors when no subscriber exists, which is fine
        let _ = self.tx.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerMessage> {
        self.tx.subscribe()
    }
}
