//! Persistent storage for the pending-write queue.
//!
//! A single SQLite table holds the writes made while disconnected, ordered
//! by an autoincrement sequence so replay preserves enqueue order across
//! process restarts. Permanently failed writes stay in the table, flagged,
//! so the hosting application can inspect and re-submit them.

use crate::config::QueueStorage;
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::sync::Mutex;
use syncline_types::{PendingWrite, Record, WriteOp};

/// Durable, strictly ordered store for pending writes.
pub struct QueueStore {
    conn: Mutex<Connection>,
}

impl QueueStore {
    /// Opens (or creates) a queue store per the configured location.
    pub fn open(storage: &QueueStorage) -> SyncResult<Self> {
        let conn = match storage {
            QueueStorage::InMemory => Connection::open_in_memory()
                .map_err(|e| SyncError::Storage(format!("failed to open queue store: {e}")))?,
            QueueStorage::File(path) => Connection::open(path)
                .map_err(|e| SyncError::Storage(format!("failed to open queue store: {e}")))?,
        };
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory queue store (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        Self::open(&QueueStorage::InMemory)
    }

    fn init_schema(&self) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pending_writes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                op TEXT NOT NULL,
                record_id TEXT,
                record TEXT NOT NULL,
                enqueued_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_pending_record
                ON pending_writes (collection, record_id);
            ",
        )
        .map_err(|e| SyncError::Storage(format!("failed to init queue schema: {e}")))?;
        Ok(())
    }

    /// Appends a write to the tail of the queue. Returns its sequence.
    pub fn append(&self, write: &PendingWrite) -> SyncResult<i64> {
        let record_json = serde_json::to_string(&write.record)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pending_writes (collection, op, record_id, record, enqueued_at, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                write.collection,
                op_to_str(write.op),
                write.record_id(),
                record_json,
                write.enqueued_at.timestamp_millis(),
                write.attempts,
            ],
        )
        .map_err(|e| SyncError::Storage(format!("failed to append pending write: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns the head of the active queue (lowest sequence, not failed).
    pub fn head(&self) -> SyncResult<Option<(i64, PendingWrite)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT seq, collection, op, record, enqueued_at, attempts
                 FROM pending_writes WHERE failed = 0 ORDER BY seq ASC LIMIT 1",
            )
            .map_err(|e| SyncError::Storage(format!("failed to prepare head query: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| SyncError::Storage(format!("failed to query head: {e}")))?;
        match rows
            .next()
            .map_err(|e| SyncError::Storage(format!("failed to read head row: {e}")))?
        {
            Some(row) => {
                let seq: i64 = row
                    .get(0)
                    .map_err(|e| SyncError::Storage(format!("{e}")))?;
                Ok(Some((seq, row_to_write(row)?)))
            }
            None => Ok(None),
        }
    }

    /// Removes a replayed write.
    pub fn remove(&self, seq: i64) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pending_writes WHERE seq = ?1", params![seq])
            .map_err(|e| SyncError::Storage(format!("failed to remove pending write: {e}")))?;
        Ok(())
    }

    /// Increments the attempt count for a write. Returns the new count.
    pub fn bump_attempts(&self, seq: i64) -> SyncResult<u32> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE pending_writes SET attempts = attempts + 1 WHERE seq = ?1",
            params![seq],
        )
        .map_err(|e| SyncError::Storage(format!("failed to bump attempts: {e}")))?;
        let attempts: u32 = conn
            .query_row(
                "SELECT attempts FROM pending_writes WHERE seq = ?1",
                params![seq],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Storage(format!("failed to read attempts: {e}")))?;
        Ok(attempts)
    }

    /// Flags a write as permanently failed, removing it from the active
    /// queue without deleting it.
    pub fn mark_failed(&self, seq: i64) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE pending_writes SET failed = 1 WHERE seq = ?1",
            params![seq],
        )
        .map_err(|e| SyncError::Storage(format!("failed to mark write failed: {e}")))?;
        Ok(())
    }

    /// Number of active (not failed) pending writes.
    pub fn pending_count(&self) -> SyncResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pending_writes WHERE failed = 0",
                [],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Storage(format!("failed to count pending writes: {e}")))?;
        Ok(count as usize)
    }

    /// All active pending writes in enqueue order.
    pub fn pending(&self) -> SyncResult<Vec<(i64, PendingWrite)>> {
        self.select_writes("failed = 0")
    }

    /// All permanently failed writes in enqueue order.
    pub fn failed(&self) -> SyncResult<Vec<(i64, PendingWrite)>> {
        self.select_writes("failed = 1")
    }

    fn select_writes(&self, filter: &str) -> SyncResult<Vec<(i64, PendingWrite)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT seq, collection, op, record, enqueued_at, attempts
                 FROM pending_writes WHERE {filter} ORDER BY seq ASC"
            ))
            .map_err(|e| SyncError::Storage(format!("failed to prepare queue query: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| SyncError::Storage(format!("failed to query queue: {e}")))?;

        let mut result = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| SyncError::Storage(format!("failed to read queue row: {e}")))?
        {
            let seq: i64 = row
                .get(0)
                .map_err(|e| SyncError::Storage(format!("{e}")))?;
            result.push((seq, row_to_write(row)?));
        }
        Ok(result)
    }

    /// Timestamp of the newest active pending write for one record, if any.
    pub fn newest_pending_for(
        &self,
        collection: &str,
        record_id: &str,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let millis: Option<i64> = conn
            .query_row(
                "SELECT MAX(enqueued_at) FROM pending_writes
                 WHERE failed = 0 AND collection = ?1 AND record_id = ?2",
                params![collection, record_id],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Storage(format!("failed to query newest pending: {e}")))?;
        Ok(millis.and_then(millis_to_utc))
    }

    /// Drops active pending writes for one record enqueued at or before
    /// `cutoff` (they lost a last-write-wins race against a remote change).
    /// Returns how many were dropped.
    pub fn prune_superseded(
        &self,
        collection: &str,
        record_id: &str,
        cutoff: DateTime<Utc>,
    ) -> SyncResult<usize> {
        let conn = self.conn.lock().unwrap();
        let dropped = conn
            .execute(
                "DELETE FROM pending_writes
                 WHERE failed = 0 AND collection = ?1 AND record_id = ?2 AND enqueued_at <= ?3",
                params![collection, record_id, cutoff.timestamp_millis()],
            )
            .map_err(|e| SyncError::Storage(format!("failed to prune pending writes: {e}")))?;
        Ok(dropped)
    }

    /// Removes every write, active and failed.
    pub fn clear(&self) -> SyncResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pending_writes", [])
            .map_err(|e| SyncError::Storage(format!("failed to clear queue: {e}")))?;
        Ok(())
    }
}

fn row_to_write(row: &rusqlite::Row<'_>) -> SyncResult<PendingWrite> {
    let collection: String = row.get(1).map_err(|e| SyncError::Storage(format!("{e}")))?;
    let op_str: String = row.get(2).map_err(|e| SyncError::Storage(format!("{e}")))?;
    let record_json: String = row.get(3).map_err(|e| SyncError::Storage(format!("{e}")))?;
    let millis: i64 = row.get(4).map_err(|e| SyncError::Storage(format!("{e}")))?;
    let attempts: u32 = row.get(5).map_err(|e| SyncError::Storage(format!("{e}")))?;

    let record: Record = serde_json::from_str(&record_json)?;
    let enqueued_at = millis_to_utc(millis)
        .ok_or_else(|| SyncError::Storage(format!("invalid enqueue timestamp: {millis}")))?;

    Ok(PendingWrite {
        collection,
        op: parse_op(&op_str),
        record,
        enqueued_at,
        attempts,
    })
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn op_to_str(op: WriteOp) -> &'static str {
    match op {
        WriteOp::Upsert => "upsert",
        WriteOp::Delete => "delete",
    }
}

fn parse_op(s: &str) -> WriteOp {
    match s {
        "delete" => WriteOp::Delete,
        _ => WriteOp::Upsert, // fallback
    }
}
