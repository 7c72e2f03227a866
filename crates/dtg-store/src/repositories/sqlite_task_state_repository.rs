//! `SQLite` implementation of the `TaskStateRepositoryPort` trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use url::Url;

use dtg_core::{
    ItemRecord, RepositoryError, ResumeCheckpoint, TaskRecord, TaskStateRepositoryPort,
    TaskStatus, TrackType,
};

/// `SQLite` implementation of the `TaskStateRepositoryPort` trait.
///
/// Stores one row per item plus one row per task, keeping registration order
/// in a `position` column. Saving an item replaces all of its task rows in a
/// single transaction. Destinations are stored as raw path bytes so that
/// non-UTF-8 paths survive a round trip.
pub struct SqliteTaskStateRepository {
    pool: SqlitePool,
}

impl SqliteTaskStateRepository {
    /// Create a new `SQLite` task state repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStateRepositoryPort for SqliteTaskStateRepository {
    async fn save_item(&self, item: &ItemRecord) -> Result<(), RepositoryError> {
        let saved_at = item.saved_at.map(|t| t.to_rfc3339());
        let mut tx = self.pool.begin().await.map_err(map_storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO download_items (dtg_item_id, session_identifier, saved_at)
            VALUES (?, ?, ?)
            ON CONFLICT(dtg_item_id) DO UPDATE SET
                session_identifier = excluded.session_identifier,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&item.dtg_item_id)
        .bind(&item.session_identifier)
        .bind(&saved_at)
        .execute(&mut *tx)
        .await
        .map_err(map_storage_error)?;

        sqlx::query("DELETE FROM download_item_tasks WHERE dtg_item_id = ?")
            .bind(&item.dtg_item_id)
            .execute(&mut *tx)
            .await
            .map_err(map_storage_error)?;

        for (position, task) in item.tasks.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            let destination = encode_destination(&task.destination_url)?;
            let checkpoint_json = task
                .resume_checkpoint
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO download_item_tasks (
                    dtg_item_id, position, content_url, track_type,
                    destination, status, resume_checkpoint
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.dtg_item_id)
            .bind(position)
            .bind(task.content_url.as_str())
            .bind(task.track_type.as_str())
            .bind(destination)
            .bind(task.status.as_str())
            .bind(&checkpoint_json)
            .execute(&mut *tx)
            .await
            .map_err(map_storage_error)?;
        }

        tx.commit().await.map_err(map_storage_error)?;

        tracing::debug!(
            target: "dtg.store",
            item = %item.dtg_item_id,
            tasks = item.tasks.len(),
            "Saved item record"
        );
        Ok(())
    }

    async fn load_item(&self, dtg_item_id: &str) -> Result<ItemRecord, RepositoryError> {
        let item = sqlx::query(
            "SELECT session_identifier, saved_at FROM download_items WHERE dtg_item_id = ?",
        )
        .bind(dtg_item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_storage_error)?
        .ok_or_else(|| RepositoryError::NotFound(format!("Download item '{dtg_item_id}'")))?;

        let session_identifier: String = item
            .try_get("session_identifier")
            .map_err(map_column_error)?;
        let saved_at: Option<String> = item.try_get("saved_at").map_err(map_column_error)?;

        let rows = sqlx::query(
            r#"
            SELECT content_url, track_type, CAST(destination AS BLOB) AS destination,
                   status, resume_checkpoint
            FROM download_item_tasks
            WHERE dtg_item_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(dtg_item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_storage_error)?;

        let tasks = rows
            .iter()
            .map(row_to_task_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ItemRecord {
            dtg_item_id: dtg_item_id.to_string(),
            session_identifier,
            tasks,
            saved_at: parse_saved_at(saved_at),
        })
    }

    async fn remove_item(&self, dtg_item_id: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_storage_error)?;

        sqlx::query("DELETE FROM download_item_tasks WHERE dtg_item_id = ?")
            .bind(dtg_item_id)
            .execute(&mut *tx)
            .await
            .map_err(map_storage_error)?;

        sqlx::query("DELETE FROM download_items WHERE dtg_item_id = ?")
            .bind(dtg_item_id)
            .execute(&mut *tx)
            .await
            .map_err(map_storage_error)?;

        tx.commit().await.map_err(map_storage_error)?;

        tracing::debug!(target: "dtg.store", item = %dtg_item_id, "Removed item record");
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query("SELECT dtg_item_id FROM download_items ORDER BY dtg_item_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_storage_error)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("dtg_item_id").map_err(map_column_error))
            .collect()
    }
}

/// Convert a database row to a `TaskRecord`.
fn row_to_task_record(row: &sqlx::sqlite::SqliteRow) -> Result<TaskRecord, RepositoryError> {
    let content_url: String = row.try_get("content_url").map_err(map_column_error)?;
    let track_type: String = row.try_get("track_type").map_err(map_column_error)?;
    let destination: Vec<u8> = row.try_get("destination").map_err(map_column_error)?;
    let status: String = row.try_get("status").map_err(map_column_error)?;
    let checkpoint_json: Option<String> =
        row.try_get("resume_checkpoint").map_err(map_column_error)?;

    let content_url = Url::parse(&content_url)
        .map_err(|e| RepositoryError::Serialization(format!("content_url '{content_url}': {e}")))?;
    let track_type = track_type
        .parse::<TrackType>()
        .map_err(RepositoryError::Serialization)?;
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown task status '{status}'")))?;
    let resume_checkpoint = checkpoint_json
        .map(|json| serde_json::from_str::<ResumeCheckpoint>(&json))
        .transpose()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    Ok(TaskRecord {
        content_url,
        track_type,
        destination_url: decode_destination(destination)?,
        resume_checkpoint,
        status,
    })
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn encode_destination(path: &Path) -> Result<Vec<u8>, RepositoryError> {
    use std::os::unix::ffi::OsStrExt;
    Ok(path.as_os_str().as_bytes().to_vec())
}

#[cfg(not(unix))]
fn encode_destination(path: &Path) -> Result<Vec<u8>, RepositoryError> {
    path.to_str()
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| {
            RepositoryError::Serialization(format!(
                "destination '{}' is not valid UTF-8",
                path.display()
            ))
        })
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn decode_destination(bytes: Vec<u8>) -> Result<PathBuf, RepositoryError> {
    use std::os::unix::ffi::OsStringExt;
    Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn decode_destination(bytes: Vec<u8>) -> Result<PathBuf, RepositoryError> {
    String::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|e| RepositoryError::Serialization(format!("destination: {e}")))
}

fn parse_saved_at(saved_at: Option<String>) -> Option<DateTime<Utc>> {
    saved_at.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    })
}

fn map_storage_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

fn map_column_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(format!("Column read error: {e}"))
}
