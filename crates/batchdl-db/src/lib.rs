//! `SQLite` persistence for batchdl.
//!
//! [`setup_database`] opens and migrates the store; a failure there is
//! fatal for the engine, which has no memory-only fallback.
//! [`SqliteDownloadsRepository`] implements
//! [`batchdl_core::DownloadsPersistencePort`].

#![deny(unsafe_code)]

pub mod factory;
pub mod repositories;
pub mod setup;

pub use factory::DbFactory;

// Re-export TestDb for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub use factory::TestDb;

pub use repositories::SqliteDownloadsRepository;

pub use setup::{SCHEMA_VERSION, setup_database};
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
