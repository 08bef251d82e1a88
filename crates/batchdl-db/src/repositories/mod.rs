//! `SQLite` repository implementations.

mod sqlite_downloads_repository;

pub use sqlite_downloads_repository::SqliteDownloadsRepository;
