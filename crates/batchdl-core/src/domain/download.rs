//! Download rows, their status, and batches.

use serde::{Deserialize, Serialize};

use super::ids::{BatchId, DownloadRowId, TransferId};
use super::request::DownloadRequest;
use crate::errors::DownloadError;

/// Lifecycle status of a single download.
///
/// `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting for a free transfer slot.
    Pending,
    /// A transfer is running.
    Downloading,
    /// The file was moved to its destination.
    Completed,
    /// The transfer failed.
    Failed {
        /// Why it failed.
        error: DownloadError,
    },
    /// Aborted by a cancel request or by a sibling's failure.
    Cancelled,
}

impl DownloadStatus {
    /// Stable integer code used by the persistence layer.
    pub const fn code(&self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Downloading => 1,
            Self::Completed => 2,
            Self::Failed { .. } => 3,
            Self::Cancelled => 4,
        }
    }

    /// Rebuild a status from its code, attaching `error` for failures.
    ///
    /// Returns `None` for unknown codes.
    pub fn from_code(code: i64, error: Option<DownloadError>) -> Option<Self> {
        let status = match code {
            0 => Self::Pending,
            1 => Self::Downloading,
            2 => Self::Completed,
            3 => Self::Failed {
                error: error.unwrap_or_else(|| DownloadError::unknown("unrecorded failure")),
            },
            4 => Self::Cancelled,
            _ => return None,
        };
        Some(status)
    }

    /// Whether this is a terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::Cancelled
        )
    }

    /// Short lowercase label for display.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A persisted download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Row identity.
    pub id: DownloadRowId,
    /// Owning batch.
    pub batch_id: BatchId,
    /// What to fetch and where to put it.
    pub request: DownloadRequest,
    /// Current status.
    pub status: DownloadStatus,
    /// Transfer handle; set only while `Downloading`.
    pub transfer_id: Option<TransferId>,
}

impl Download {
    /// Move to a terminal status, clearing the transfer handle.
    pub fn finish(&mut self, status: DownloadStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.transfer_id = None;
    }

    /// Record that `transfer` is now carrying this download.
    pub fn start(&mut self, transfer: TransferId) {
        self.status = DownloadStatus::Downloading;
        self.transfer_id = Some(transfer);
    }

    /// Put the download back in the pending state with no transfer.
    pub fn reset(&mut self) {
        self.status = DownloadStatus::Pending;
        self.transfer_id = None;
    }
}

/// A group of downloads tracked, persisted and failed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadBatch {
    /// Store-assigned id.
    pub id: BatchId,
    /// Downloads in submission order.
    pub downloads: Vec<Download>,
}

impl DownloadBatch {
    /// The requests of this batch, in submission order.
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.downloads.iter().map(|d| d.request.clone()).collect()
    }

    /// Whether every download has completed successfully.
    pub fn is_completed(&self) -> bool {
        self.downloads
            .iter()
            .all(|d| d.status == DownloadStatus::Completed)
    }
}
