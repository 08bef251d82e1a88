//! Composition helpers for building repositories over a pool.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::repositories::SqliteDownloadsRepository;

/// Factory for repository instances with `SQLite` backends.
pub struct DbFactory;

impl DbFactory {
    /// Create the downloads repository from a pool.
    pub fn downloads_repository(pool: SqlitePool) -> Arc<SqliteDownloadsRepository> {
        Arc::new(SqliteDownloadsRepository::new(pool))
    }
}

/// Test database helper for integration tests.
///
/// An in-memory database with the production schema applied. Clones share
/// the same database, so a test can drop an engine and start another one
/// over the same state.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Clone)]
pub struct TestDb {
    pool: SqlitePool,
}

#[cfg(any(test, feature = "test-utils"))]
impl TestDb {
    /// Create a new in-memory test database with full schema.
    pub async fn new() -> anyhow::Result<Self> {
        let pool = crate::setup::setup_test_database().await?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A downloads repository over this database.
    pub fn downloads_repository(&self) -> Arc<SqliteDownloadsRepository> {
        DbFactory::downloads_repository(self.pool.clone())
    }
}
