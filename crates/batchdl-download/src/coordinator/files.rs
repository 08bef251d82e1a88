//! File-system steps around a transfer: reading and writing resume data,
//! and moving a finished body to its destination.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use batchdl_core::{DownloadError, DownloadRequest};

/// Read saved resume data, if any.
pub async fn read_resume_data(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(data) if data.is_empty() => None,
        Ok(data) => Some(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable resume data");
            None
        }
    }
}

/// Write resume data atomically: a sibling temp file renamed into place.
pub async fn write_resume_data(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = sibling(path, ".tmp");
    tokio::fs::write(&staging, data).await?;
    if let Err(e) = tokio::fs::rename(&staging, path).await {
        remove_quietly(&staging).await;
        return Err(e);
    }
    Ok(())
}

/// Move a finished body to the request's destination.
///
/// Clears the resume file and any previous destination first, creates the
/// destination directory, then renames. A rename across file systems falls
/// back to copy and delete.
pub async fn move_into_place(temp: &Path, request: &DownloadRequest) -> Result<(), DownloadError> {
    remove_quietly(&request.resume_path).await;
    remove_if_exists(&request.destination)
        .await
        .map_err(|e| DownloadError::from_io_error(&e))?;

    if let Some(parent) = request
        .destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
    }

    if tokio::fs::rename(temp, &request.destination).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(temp, &request.destination)
        .await
        .map_err(|e| DownloadError::from_io_error(&e))?;
    remove_quietly(temp).await;
    Ok(())
}

/// Delete a file, logging anything but "not found".
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = remove_if_exists(path).await {
        tracing::debug!(path = %path.display(), error = %e, "Could not remove file");
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map_or_else(OsString::new, ToOwned::to_owned);
    name.push(suffix);
    path.with_file_name(name)
}
