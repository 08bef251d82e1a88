//! Port definitions (trait abstractions) for external systems.
//!
//! The engine depends only on these traits; adapters implement them:
//! `batchdl-db` provides the persistence store and `batchdl-download`
//! provides the HTTP transfer session.

mod downloads_persistence;
mod transfer_session;

use thiserror::Error;

pub use downloads_persistence::DownloadsPersistencePort;
pub use transfer_session::{
    ActiveTransfer, TransferEvent, TransferEventSink, TransferSessionPort,
};

/// Domain-specific errors for repository operations.
///
/// Abstracts away storage implementation details (e.g., sqlx errors).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend error (database, filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A constraint was violated (e.g., foreign key, unique constraint).
    #[error("Constraint violation: {0}")]
    Constraint(String),
}
