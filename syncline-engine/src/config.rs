//! Engine configuration.

use crate::error::{SyncError, SyncResult};
use std::path::PathBuf;
use std::time::Duration;

/// Where the durable pending-write queue lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStorage {
    /// In-memory queue. Writes do not survive a restart; intended for
    /// tests and ephemeral embedders.
    InMemory,
    /// SQLite file at the given path.
    File(PathBuf),
}

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Collections to keep synchronized. Must be non-empty.
    pub tracked_collections: Vec<String>,
    /// How often to heartbeat the remote endpoint while connected.
    pub heartbeat_interval: Duration,
    /// Base delay for reconnect backoff.
    pub reconnect_base_delay: Duration,
    /// Ceiling for reconnect backoff.
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before the engine reports `Offline`.
    pub max_reconnect_attempts: u32,
    /// Consecutive missed heartbeats before `Degraded` becomes
    /// `Disconnected`.
    pub max_missed_heartbeats: u32,
    /// Replay attempts before a pending write is marked permanently failed.
    pub max_write_attempts: u32,
    /// Durable queue location.
    pub queue_storage: QueueStorage,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tracked_collections: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            max_missed_heartbeats: 3,
            max_write_attempts: 5,
            queue_storage: QueueStorage::InMemory,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration. Called at engine construction; the only
    /// failures the engine ever surfaces synchronously.
    pub fn validate(&self) -> SyncResult<()> {
        if self.tracked_collections.is_empty() {
            return Err(SyncError::Config(
                "tracked_collections must not be empty".into(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SyncError::Config("heartbeat_interval must be > 0".into()));
        }
        if self.reconnect_base_delay.is_zero() {
            return Err(SyncError::Config("reconnect_base_delay must be > 0".into()));
        }
        if self.reconnect_max_delay < self.reconnect_base_delay {
            return Err(SyncError::Config(
                "reconnect_max_delay must be >= reconnect_base_delay".into(),
            ));
        }
        if self.max_missed_heartbeats == 0 {
            return Err(SyncError::Config("max_missed_heartbeats must be > 0".into()));
        }
        if self.max_write_attempts == 0 {
            return Err(SyncError::Config("max_write_attempts must be > 0".into()));
        }
        Ok(())
    }
}
