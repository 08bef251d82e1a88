//! Error types for downloads, batches, and the engine.
//!
//! `DownloadError` is serializable and does not hold `std::io::Error`
//! directly; I/O failures keep their kind and message as strings so the
//! error can be persisted alongside a failed row.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::RepositoryError;

/// Why a single transfer failed.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadError {
    /// The transport gave up waiting.
    #[error("Request timed out")]
    Timeout,

    /// The connection dropped mid-transfer.
    #[error("Connection lost")]
    ConnectionLost,

    /// The host could not be resolved or connected to.
    #[error("Server unreachable")]
    ServerUnreachable,

    /// The server answered with a non-2xx status.
    #[error("Server responded with status {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The disk filled up while writing.
    #[error("No space left on device")]
    NoDiskSpace,

    /// A file-system step (moving, writing) failed.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error.
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Anything the transport could not classify.
    #[error("{message}")]
    Unknown {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Classify a `std::io::Error`.
    ///
    /// A full disk gets its own variant; everything else keeps the kind name.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            return Self::NoDiskSpace;
        }
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    /// Create an unclassified error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Whether retrying later could plausibly succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionLost | Self::ServerUnreachable => true,
            Self::Server { status } => *status >= 500,
            Self::NoDiskSpace | Self::Io { .. } | Self::Unknown { .. } => false,
        }
    }

    /// A short message suitable for end users.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => "The server took too long to respond.".to_string(),
            Self::ConnectionLost => "The network connection was lost.".to_string(),
            Self::ServerUnreachable => "Could not reach the server.".to_string(),
            Self::Server { status } => format!("The server returned an error ({status})."),
            Self::NoDiskSpace => "There is not enough free disk space.".to_string(),
            Self::Io { message, .. } => format!("Could not save the file: {message}"),
            Self::Unknown { message } => message.clone(),
        }
    }
}

/// Terminal outcome of a batch that did not succeed.
///
/// Cancellation is its own variant so callers can tell a user-initiated
/// stop apart from a failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// The batch was cancelled.
    #[error("Batch cancelled")]
    Cancelled,

    /// A download in the batch failed; siblings were cancelled.
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    /// The engine shut down before the batch reached an outcome.
    ///
    /// The batch is still persisted and resumes on the next start.
    #[error("Download engine stopped")]
    Stopped,
}

impl BatchError {
    /// Whether this is a user-initiated cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The underlying download error, if any.
    pub const fn download_error(&self) -> Option<&DownloadError> {
        match self {
            Self::Download(err) => Some(err),
            Self::Cancelled | Self::Stopped => None,
        }
    }
}

/// Errors returned by engine operations.
#[derive(Clone, Debug, Error)]
pub enum EngineError {
    /// The persistence store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    /// A batch must contain at least one request.
    #[error("Cannot submit an empty batch")]
    EmptyBatch,

    /// The engine is no longer running.
    #[error("Download engine stopped")]
    Stopped,
}
