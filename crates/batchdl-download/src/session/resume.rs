//! Resume data produced by the HTTP session.
//!
//! The engine treats resume data as opaque bytes. For this session it is a
//! small JSON document pointing at the partial body left on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a failed transfer left off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    /// URL the partial body came from.
    pub url: String,
    /// Partial body on disk.
    pub partial_path: PathBuf,
    /// Bytes in the partial body when the transfer stopped.
    pub bytes_written: u64,
}

impl ResumeToken {
    /// Serialize for the engine to store.
    pub fn encode(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(self).ok()
    }

    /// Parse resume data. Anything unreadable is ignored.
    pub fn decode(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }

    /// The byte offset to continue from, if the token still applies to
    /// `url` and the partial body is on disk.
    pub async fn usable_offset(&self, url: &str) -> Option<u64> {
        if self.url != url {
            return None;
        }
        let len = partial_len(&self.partial_path).await?;
        (len > 0).then_some(len)
    }
}

async fn partial_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len())
}
