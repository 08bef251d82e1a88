//! Default on-disk locations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors resolving default paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// The platform has no per-user data directory.
    #[error("Could not determine the user data directory")]
    NoDataDir,
}

/// Root directory for batchdl state (`<data dir>/batchdl`).
pub fn data_root() -> Result<PathBuf, PathError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("batchdl"))
        .ok_or(PathError::NoDataDir)
}

/// Default database path (`<data dir>/batchdl/downloads.db`).
pub fn database_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("downloads.db"))
}

/// Directory for in-flight transfer bodies (`<data dir>/batchdl/partial`).
pub fn temp_directory() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("partial"))
}
