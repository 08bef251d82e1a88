//! Core domain types and port definitions for batchdl.
//!
//! This crate has no I/O of its own. It defines the batch and download
//! model, the error vocabulary, and the two ports the engine is wired
//! against: [`DownloadsPersistencePort`] and [`TransferSessionPort`].

#![deny(unsafe_code)]

pub mod config;
pub mod domain;
pub mod errors;
pub mod paths;
pub mod ports;

pub use config::EngineConfig;
pub use domain::{
    BatchId, Download, DownloadBatch, DownloadRequest, DownloadRowId, DownloadStatus, TransferId,
    resume_path_for,
};
pub use errors::{BatchError, DownloadError, EngineError};
pub use ports::{
    ActiveTransfer, DownloadsPersistencePort, RepositoryError, TransferEvent,
    TransferEventSink, TransferSessionPort,
};
