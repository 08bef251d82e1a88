//! Database setup, schema creation, and schema upgrades.
//!
//! The schema version lives in `PRAGMA user_version`.
//!
//! # Upgrade from version 1
//!
//! Version 1 stored the transfer handle as a non-nullable column. Upgrading
//! drops and recreates the `download` table, so any rows it held are lost
//! and those files will be fetched again. Batches left without downloads are
//! deleted in the same step; batch ids keep counting from where they were.
//! The number of discarded rows is logged at `warn` level.

use std::path::Path;

use anyhow::{Context, Result, bail};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 2;

const CREATE_BATCH_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS batch (
        id INTEGER PRIMARY KEY AUTOINCREMENT
    )
"#;

const CREATE_DOWNLOAD_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS download (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        active_transfer_id INTEGER,
        url TEXT NOT NULL,
        resume_path TEXT NOT NULL,
        destination_path TEXT NOT NULL,
        expected_size INTEGER,
        status INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        batch_id INTEGER NOT NULL REFERENCES batch(id) ON DELETE CASCADE
    )
"#;

const CREATE_DOWNLOAD_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_download_batch_id ON download(batch_id)";

/// Opens (creating if needed) the database at `db_path` and brings its
/// schema up to [`SCHEMA_VERSION`].
///
/// # Errors
///
/// Returns an error if:
/// - The parent directory or database file cannot be created
/// - The file was written by a newer schema version
/// - Schema creation or upgrade fails
///
/// # Example
///
/// ```rust,no_run
/// use batchdl_db::setup_database;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = setup_database(Path::new("/var/lib/batchdl/downloads.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true),
    )
    .await
    .with_context(|| format!("opening database {}", db_path.display()))?;

    migrate(&pool).await?;
    tracing::debug!(path = %db_path.display(), "Database ready");

    Ok(pool)
}

/// Sets up an in-memory `SQLite` database for testing.
///
/// A single connection is used so every query sees the same database.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    use sqlx::sqlite::SqlitePoolOptions;
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Brings the schema to [`SCHEMA_VERSION`].
async fn migrate(pool: &SqlitePool) -> Result<()> {
    let version = user_version(pool).await?;

    if version > SCHEMA_VERSION {
        bail!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        );
    }

    if version == 1 || (version == 0 && table_exists(pool, "download").await?) {
        drop_download_table(pool).await?;
    }

    create_schema(pool).await?;

    if version != SCHEMA_VERSION {
        set_user_version(pool, SCHEMA_VERSION).await?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "Database schema upgraded");
    }

    Ok(())
}

/// Creates all tables and indexes. Safe to call repeatedly.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_BATCH_TABLE).execute(pool).await?;
    sqlx::query(CREATE_DOWNLOAD_TABLE).execute(pool).await?;
    sqlx::query(CREATE_DOWNLOAD_INDEX).execute(pool).await?;
    Ok(())
}

/// Destructive step of the version 1 upgrade.
async fn drop_download_table(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    let discarded: i64 = sqlx::query("SELECT COUNT(*) AS n FROM download")
        .fetch_one(&mut *tx)
        .await?
        .try_get("n")?;

    sqlx::query("DROP TABLE download").execute(&mut *tx).await?;

    // Every batch is empty now.
    let discarded_batches = if table_exists(&mut *tx, "batch").await? {
        sqlx::query("DELETE FROM batch")
            .execute(&mut *tx)
            .await?
            .rows_affected()
    } else {
        0
    };

    tx.commit().await.context("committing schema upgrade")?;

    tracing::warn!(
        discarded_rows = discarded,
        discarded_batches,
        "Schema upgrade dropped the download table; in-flight downloads will be fetched again"
    );
    Ok(())
}

async fn table_exists<'e, E>(executor: E, name: &str) -> Result<bool>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(name)
        .fetch_one(executor)
        .await?;
    let count: i64 = row.try_get("n")?;
    Ok(count > 0)
}

async fn user_version(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("PRAGMA user_version").fetch_one(pool).await?;
    Ok(row.try_get(0)?)
}

async fn set_user_version(pool: &SqlitePool, version: i64) -> Result<()> {
    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {version}"))
        .execute(pool)
        .await?;
    Ok(())
}
