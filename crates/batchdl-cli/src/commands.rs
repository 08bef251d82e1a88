//! Available subcommands.

use clap::Subcommand;

use batchdl_core::DownloadRequest;

use crate::parser::parse_download;

/// Operations on the download store.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download files as one batch; any failure fails the whole batch
    Fetch {
        /// Files to download, each as URL=DEST
        #[arg(value_name = "URL=DEST", required = true, value_parser = parse_download)]
        downloads: Vec<DownloadRequest>,
    },

    /// List batches waiting in the store
    List,

    /// Cancel every ongoing batch
    CancelAll,
}
