//! Download request value type.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extension appended to a destination path to derive its resume-data path.
pub const RESUME_EXTENSION: &str = "resume";

/// A single remote file to fetch.
///
/// Immutable once submitted. Equality is structural, so a request taken
/// from a submission can be used to look up its `DownloadHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Remote URL.
    pub url: String,
    /// Final location of the downloaded file.
    pub destination: PathBuf,
    /// Where resume data is written when a transfer fails part-way.
    pub resume_path: PathBuf,
    /// Expected size in bytes, when the caller knows it.
    ///
    /// Used to weight the download inside its batch progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
}

impl DownloadRequest {
    /// Create a request whose resume path sits next to the destination.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let resume_path = resume_path_for(&destination);
        Self {
            url: url.into(),
            destination,
            resume_path,
            expected_size: None,
        }
    }

    /// Override the resume-data path.
    #[must_use]
    pub fn with_resume_path(mut self, resume_path: impl Into<PathBuf>) -> Self {
        self.resume_path = resume_path.into();
        self
    }

    /// Record the expected size of the remote file.
    #[must_use]
    pub const fn with_expected_size(mut self, bytes: u64) -> Self {
        self.expected_size = Some(bytes);
        self
    }
}

/// Derive the default resume path for a destination: `<destination>.resume`.
pub fn resume_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".");
    name.push(RESUME_EXTENSION);
    destination.with_file_name(name)
}
