//! Domain types for batches and their downloads.

mod download;
mod ids;
mod request;

pub use download::{Download, DownloadBatch, DownloadStatus};
pub use ids::{BatchId, DownloadRowId, TransferId};
pub use request::{DownloadRequest, RESUME_EXTENSION, resume_path_for};
