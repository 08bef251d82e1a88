//! `SQLite` implementation of the `DownloadsPersistencePort` trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::SqlitePool;

use batchdl_core::{
    BatchId, Download, DownloadBatch, DownloadError, DownloadRequest, DownloadRowId,
    DownloadStatus, DownloadsPersistencePort, RepositoryError, TransferId,
};

/// `SQLite` implementation of the `DownloadsPersistencePort` trait.
///
/// Every multi-row write runs inside one transaction.
pub struct SqliteDownloadsRepository {
    pool: SqlitePool,
}

impl SqliteDownloadsRepository {
    /// Create a new repository over `pool`.
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DownloadsPersistencePort for SqliteDownloadsRepository {
    async fn retrieve_all(&self) -> Result<Vec<DownloadBatch>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, batch_id, active_transfer_id, url, resume_path,
                   destination_path, expected_size, status, error
            FROM download
            ORDER BY batch_id ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut batches: Vec<DownloadBatch> = Vec::new();
        for row in &rows {
            let download = row_to_download(row)?;
            match batches.last_mut() {
                Some(batch) if batch.id == download.batch_id => batch.downloads.push(download),
                _ => batches.push(DownloadBatch {
                    id: download.batch_id,
                    downloads: vec![download],
                }),
            }
        }

        Ok(batches)
    }

    async fn insert(&self, requests: &[DownloadRequest]) -> Result<DownloadBatch, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let batch_id = sqlx::query("INSERT INTO batch DEFAULT VALUES")
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .last_insert_rowid();
        let batch_id = BatchId(batch_id);

        let status = DownloadStatus::Pending;
        let mut downloads = Vec::with_capacity(requests.len());
        for request in requests {
            let row_id = sqlx::query(
                r#"
                INSERT INTO download (
                    active_transfer_id, url, resume_path, destination_path,
                    expected_size, status, error, batch_id
                ) VALUES (NULL, ?, ?, ?, ?, ?, NULL, ?)
                "#,
            )
            .bind(&request.url)
            .bind(path_to_text(&request.resume_path)?)
            .bind(path_to_text(&request.destination)?)
            .bind(request.expected_size.map(u64_to_column).transpose()?)
            .bind(status.code())
            .bind(batch_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .last_insert_rowid();

            downloads.push(Download {
                id: DownloadRowId(row_id),
                batch_id,
                request: request.clone(),
                status: status.clone(),
                transfer_id: None,
            });
        }

        tx.commit().await.map_err(storage_error)?;

        tracing::debug!(batch_id = %batch_id, downloads = downloads.len(), "Inserted batch");
        Ok(DownloadBatch {
            id: batch_id,
            downloads,
        })
    }

    async fn update_many(&self, downloads: &[Download]) -> Result<(), RepositoryError> {
        if downloads.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        for download in downloads {
            let error = match &download.status {
                DownloadStatus::Failed { error } => Some(
                    serde_json::to_string(error)
                        .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
                ),
                _ => None,
            };
            let transfer = download
                .transfer_id
                .map(|t| u64_to_column(t.0))
                .transpose()?;

            let result = sqlx::query(
                r#"
                UPDATE download
                SET status = ?, error = ?, active_transfer_id = ?
                WHERE id = ?
                "#,
            )
            .bind(download.status.code())
            .bind(error)
            .bind(transfer)
            .bind(download.id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(format!(
                    "Download with ID '{}'",
                    download.id
                )));
            }
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn delete(&self, batch_ids: &[BatchId]) -> Result<(), RepositoryError> {
        if batch_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        for batch_id in batch_ids {
            sqlx::query("DELETE FROM download WHERE batch_id = ?")
                .bind(batch_id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
            sqlx::query("DELETE FROM batch WHERE id = ?")
                .bind(batch_id.0)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;

        tracing::debug!(batches = batch_ids.len(), "Deleted batches");
        Ok(())
    }
}

/// Convert a database row to a `Download`.
fn row_to_download(row: &sqlx::sqlite::SqliteRow) -> Result<Download, RepositoryError> {
    use sqlx::Row;

    let id: i64 = row.try_get("id").map_err(map_column_error)?;
    let batch_id: i64 = row.try_get("batch_id").map_err(map_column_error)?;
    let transfer: Option<i64> = row
        .try_get("active_transfer_id")
        .map_err(map_column_error)?;
    let url: String = row.try_get("url").map_err(map_column_error)?;
    let resume_path: String = row.try_get("resume_path").map_err(map_column_error)?;
    let destination: String = row.try_get("destination_path").map_err(map_column_error)?;
    let expected_size: Option<i64> = row.try_get("expected_size").map_err(map_column_error)?;
    let code: i64 = row.try_get("status").map_err(map_column_error)?;
    let error_json: Option<String> = row.try_get("error").map_err(map_column_error)?;

    let error: Option<DownloadError> = error_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let status = DownloadStatus::from_code(code, error).ok_or_else(|| {
        RepositoryError::Serialization(format!("Unknown status code {code} for download {id}"))
    })?;

    Ok(Download {
        id: DownloadRowId(id),
        batch_id: BatchId(batch_id),
        request: DownloadRequest {
            url,
            destination: PathBuf::from(destination),
            resume_path: PathBuf::from(resume_path),
            expected_size: expected_size.map(column_to_u64).transpose()?,
        },
        status,
        transfer_id: transfer.map(column_to_u64).transpose()?.map(TransferId),
    })
}

fn path_to_text(path: &Path) -> Result<&str, RepositoryError> {
    path.to_str().ok_or_else(|| {
        RepositoryError::Serialization(format!("Path is not valid UTF-8: {}", path.display()))
    })
}

fn u64_to_column(value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("Value {value} exceeds i64 range")))
}

fn column_to_u64(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("Negative value {value} in column")))
}

fn storage_error(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() || db.is_unique_violation() => {
            RepositoryError::Constraint(db.message().to_string())
        }
        _ => RepositoryError::Storage(e.to_string()),
    }
}

fn map_column_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(format!("Column read error: {e}"))
}
