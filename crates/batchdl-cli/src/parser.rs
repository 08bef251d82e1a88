//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use batchdl_core::DownloadRequest;
use batchdl_core::config::DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS;

use crate::commands::Commands;
use crate::error::CliError;

/// Download files in batches that survive restarts.
#[derive(Parser, Debug)]
#[command(name = "batchdl")]
#[command(about = "Download files in batches that survive restarts")]
#[command(version)]
pub struct Cli {
    /// Path to the download store
    #[arg(long = "db", env = "BATCHDL_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Maximum number of simultaneous transfers
    #[arg(
        long = "max-concurrent",
        env = "BATCHDL_MAX_CONCURRENT",
        global = true,
        default_value_t = DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS
    )]
    pub max_concurrent: usize,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Parse a `URL=DEST` argument.
///
/// The split happens at the last `=`, so query strings in the URL survive.
pub fn parse_download(input: &str) -> Result<DownloadRequest, CliError> {
    let (url, destination) = input
        .rsplit_once('=')
        .ok_or_else(|| CliError::invalid_download(input, "expected URL=DEST"))?;

    let url = url.trim();
    let destination = destination.trim();
    if url.is_empty() {
        return Err(CliError::invalid_download(input, "missing URL"));
    }
    if destination.is_empty() {
        return Err(CliError::invalid_download(input, "missing destination"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CliError::invalid_download(input, "URL must be http or https"));
    }

    Ok(DownloadRequest::new(url, destination))
}
