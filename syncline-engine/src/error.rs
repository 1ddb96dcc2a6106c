//! Error types for the sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid engine configuration, surfaced synchronously at start.
    #[error("configuration error: {0}")]
    Config(String),

    /// A feed subscription could not be opened.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// An operation timed out without a definitive answer.
    #[error("operation timed out")]
    Timeout,

    /// The remote endpoint explicitly refused the operation.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// Durable store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An event or write could not be translated into a cache or remote
    /// operation (e.g. a record with no id).
    #[error("translation error: {0}")]
    Translation(String),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// Whether this error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout | SyncError::Subscribe(_)
        )
    }
}
