//! Local cache adapter boundary.
//!
//! The durable local store is owned by the hosting application; the engine
//! only writes through this trait. The `suppress_upstream` flag is the echo
//! guard: a write applied on behalf of a remote or peer change must not be
//! re-propagated by the cache as if it were a fresh local edit.

use crate::error::SyncResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use syncline_types::Record;

/// The interface to the durable local store, keyed by collection + id.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Reads a record.
    async fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Record>>;

    /// Inserts or replaces a record keyed by its id.
    ///
    /// With `suppress_upstream` set, the cache must not forward the write
    /// to the remote store.
    async fn put(&self, collection: &str, record: Record, suppress_upstream: bool)
        -> SyncResult<()>;

    /// Removes a record.
    async fn delete(&self, collection: &str, id: &str, suppress_upstream: bool)
        -> SyncResult<()>;
}

/// An in-memory cache for tests and ephemeral embedders.
///
/// Tracks which writes arrived without the echo guard so tests can assert
/// that remote applies never masquerade as local edits.
#[derive(Default)]
pub struct MemoryCache {
    records: Mutex<HashMap<(String, String), Record>>,
    unguarded_writes: Mutex<Vec<(String, String)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes that arrived with `suppress_upstream = false`, i.e. writes
    /// the cache would have propagated upstream as fresh local edits.
    pub fn unguarded_writes(&self) -> Vec<(String, String)> {
        self.unguarded_writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Record>> {
        let records = self.records.lock().expect("cache lock poisoned");
        Ok(records.get(&(collection.to_string(), id.to_string())).cloned())
    }

    async fn put(
        &self,
        collection: &str,
        record: Record,
        suppress_upstream: bool,
    ) -> SyncResult<()> {
        let id = record.id().unwrap_or_default().to_string();
        if !suppress_upstream {
            self.unguarded_writes
                .lock()
                .expect("cache lock poisoned")
                .push((collection.to_string(), id.clone()));
        }
        let mut records = self.records.lock().expect("cache lock poisoned");
        records.insert((collection.to_string(), id), record);
        Ok(())
    }

    async fn delete(
        &self,
        collection: &str,
        id: &str,
        suppress_upstream: bool,
    ) -> SyncResult<()> {
        if !suppress_upstream {
            self.unguarded_writes
                .lock()
                .expect("cache lock poisoned")
                .push((collection.to_string(), id.to_string()));
        }
        let mut records = self.records.lock().expect("cache lock poisoned");
        records.remove(&(collection.to_string(), id.to_string()));
        Ok(())
    }
}
