//! Core type definitions for Syncline.
//!
//! This crate defines the fundamental, domain-agnostic types shared by the
//! sync engine and its embedders:
//! - Instance identifiers (UUID v7)
//! - Change events delivered by the remote feed
//! - Records (opaque JSON payloads with a stable identity)
//! - Pending writes queued while disconnected
//!
//! Everything the engine actually stores or transmits lives here; all
//! domain-specific shapes (companies, keywords, brand kits, …) are opaque
//! `Record` payloads as far as Syncline is concerned.

mod event;
mod ids;
mod record;
mod write;

pub use event::{ChangeEvent, ChangeOp, Origin};
pub use ids::InstanceId;
pub use record::Record;
pub use write::{PendingWrite, WriteOp};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("record has no '{0}' field")]
    MissingField(&'static str),
}
