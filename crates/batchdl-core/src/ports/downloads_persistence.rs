//! Downloads persistence port definition.
//!
//! Durable storage of batches and their downloads so that work survives a
//! process restart.
//!
//! # Design
//!
//! - A batch is the unit of durability: inserted and deleted as a whole
//! - Updates only touch status, failure detail and the transfer handle
//! - Progress is never persisted

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::{BatchId, Download, DownloadBatch, DownloadRequest};

/// Port for persisting batches.
///
/// Implemented by `batchdl-db` and injected into the download engine.
#[async_trait]
pub trait DownloadsPersistencePort: Send + Sync {
    /// Load every stored batch, ordered by batch id, downloads in
    /// submission order.
    async fn retrieve_all(&self) -> Result<Vec<DownloadBatch>, RepositoryError>;

    /// Store a new batch of pending downloads.
    ///
    /// Atomic: either the batch and all of its rows are written or none are.
    async fn insert(&self, requests: &[DownloadRequest]) -> Result<DownloadBatch, RepositoryError>;

    /// Persist the status and transfer handle of one download.
    async fn update(&self, download: &Download) -> Result<(), RepositoryError> {
        self.update_many(std::slice::from_ref(download)).await
    }

    /// Persist the status and transfer handle of several downloads.
    async fn update_many(&self, downloads: &[Download]) -> Result<(), RepositoryError>;

    /// Remove batches together with their downloads, atomically per call.
    async fn delete(&self, batch_ids: &[BatchId]) -> Result<(), RepositoryError>;
}
