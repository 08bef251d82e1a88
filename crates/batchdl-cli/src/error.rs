//! CLI-specific error types.

use thiserror::Error;

/// Errors raised by the CLI adapter itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    /// A `URL=DEST` argument could not be parsed.
    #[error("Invalid download '{input}': {reason}")]
    InvalidDownload {
        /// The argument as given.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl CliError {
    pub(crate) fn invalid_download(input: &str, reason: &'static str) -> Self {
        Self::InvalidDownload {
            input: input.to_string(),
            reason,
        }
    }
}
