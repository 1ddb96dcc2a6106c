//! Real-time, multi-device data synchronization engine for Syncline.
//!
//! Keeps a durable local cache consistent with a remote store across
//! multiple devices and multiple concurrently open instances of the
//! application, while tolerating network loss, duplicate delivery, and
//! concurrent local writes.
//!
//! # Architecture
//!
//! - **Subscriptions**: one feed channel per tracked collection, scoped to
//!   the current identity
//! - **Router**: applies incoming change events to the local cache under an
//!   echo guard and fans them out to listeners and sibling instances
//! - **Bus**: cross-instance coordination so a remote change received by
//!   one instance is applied once, locally, everywhere
//! - **Queue**: durable replay of writes made while disconnected
//! - **Monitor**: heartbeats, backoff, and reconnection
//! - **Status**: one displayed health value derived from all of the above
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use syncline_engine::{
//!     EngineConfig, InProcessBus, MemoryCache, SyncEngine,
//!     remote::mock::MockRemote,
//! };
//!
//! # async fn run() -> syncline_engine::SyncResult<()> {
//! let remote = Arc::new(MockRemote::new());
//! let config = EngineConfig {
//!     tracked_collections: vec!["companies".into()],
//!     ..Default::default()
//! };
//! let engine = SyncEngine::new(
//!     config,
//!     Arc::new(MemoryCache::new()),
//!     remote.clone(),
//!     remote,
//!     Arc::new(InProcessBus::new()),
//! )?;
//! engine.start("user-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod cache;
mod config;
mod engine;
mod error;
mod monitor;
mod queue;
mod queue_store;
pub mod remote;
mod router;
mod status;
mod subscriptions;

pub use bus::{InProcessBus, PeerBus, PeerMessage, PeerPayload, DEFAULT_BUS_CAPACITY};
pub use cache::{LocalCache, MemoryCache};
pub use config::{EngineConfig, QueueStorage};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use monitor::{ConnectionMonitor, ConnectionState};
pub use queue::{FlushReport, PendingWriteQueue};
pub use queue_store::QueueStore;
pub use remote::{ChangeFeed, FeedSubscription, RemoteWriter};
pub use router::ChangeRouter;
pub use status::{StatusPublisher, SyncStatus};
pub use subscriptions::SubscriptionManager;

// Re-export the vocabulary crate so embedders need only one dependency.
pub use syncline_types::{ChangeEvent, ChangeOp, InstanceId, Origin, PendingWrite, Record, WriteOp};
