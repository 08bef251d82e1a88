//! Transfer session port definition.
//!
//! A transfer session performs the actual byte transfer, concurrently and
//! outside the engine's serialized context. It reports back through a
//! [`TransferEventSink`], which the engine hands to the session when it is
//! constructed.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::{DownloadRequest, TransferId};
use crate::errors::DownloadError;

/// A transfer the session is currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTransfer {
    /// Session-issued handle.
    pub id: TransferId,
    /// Remote URL being fetched.
    pub url: String,
}

/// Something that happened to a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Bytes were written.
    Progress {
        /// Transfer handle.
        id: TransferId,
        /// Total bytes written so far, including any resumed prefix.
        written: u64,
        /// Total expected bytes, when the server announced a length.
        expected: Option<u64>,
    },
    /// The transfer completed; the body is in a temporary file.
    Finished {
        /// Transfer handle.
        id: TransferId,
        /// Temporary file holding the complete body.
        temp_path: PathBuf,
    },
    /// The transfer failed.
    Failed {
        /// Transfer handle.
        id: TransferId,
        /// Classified cause.
        error: DownloadError,
        /// Opaque payload that lets a later transfer continue.
        resume_data: Option<Vec<u8>>,
    },
    /// The transfer stopped because it was cancelled.
    Cancelled {
        /// Transfer handle.
        id: TransferId,
    },
    /// Every queued event has been delivered and no transfer is running.
    EventsDrained,
}

impl TransferEvent {
    /// The transfer this event refers to, if any.
    pub const fn transfer_id(&self) -> Option<TransferId> {
        match self {
            Self::Progress { id, .. }
            | Self::Finished { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => Some(*id),
            Self::EventsDrained => None,
        }
    }
}

/// Receiver of transfer events.
///
/// Implementations must not block: they queue the event and return.
pub trait TransferEventSink: Send + Sync {
    /// Deliver an event.
    fn emit(&self, event: TransferEvent);
}

/// Port for the concurrent transfer mechanism.
#[async_trait]
pub trait TransferSessionPort: Send + Sync {
    /// Begin fetching `request`, continuing from `resume_data` when given.
    ///
    /// Returns immediately; the outcome arrives as events.
    fn start(&self, request: &DownloadRequest, resume_data: Option<Vec<u8>>) -> TransferId;

    /// Abort a transfer. Unknown ids are ignored.
    fn cancel(&self, id: TransferId);

    /// Transfers already running in the underlying transport.
    ///
    /// Used once at startup to reconcile with persisted rows.
    async fn active_transfers(&self) -> Vec<ActiveTransfer>;
}
