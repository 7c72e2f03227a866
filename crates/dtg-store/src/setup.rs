//! Database setup and initialization.
//!
//! This module provides the `setup_database()` function for initializing
//! the `SQLite` database with the task state schema. Hosts call this with the
//! path of their state database.

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::Path;

/// Sets up the `SQLite` database connection and ensures the schema exists.
///
/// Creates the parent directory and the database file when missing. Safe to
/// call on an existing database.
///
/// # Example
///
/// ```rust,no_run
/// use dtg_store::{SqliteTaskStateRepository, setup_database};
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = setup_database(Path::new("/var/lib/dtg/state.db")).await?;
/// let repo = SqliteTaskStateRepository::new(pool);
/// # Ok(())
/// # }
/// ```
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true),
    )
    .await?;

    create_schema(&pool).await?;
    tracing::debug!(target: "dtg.store", path = %db_path.display(), "Task state database ready");

    Ok(pool)
}

/// Sets up an in-memory `SQLite` database for testing.
///
/// The pool holds a single connection that never expires, since every
/// in-memory connection is a separate database.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Creates the task state schema. Every statement is `IF NOT EXISTS`.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS download_items (
            dtg_item_id TEXT PRIMARY KEY NOT NULL,
            session_identifier TEXT NOT NULL,
            saved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS download_item_tasks (
            dtg_item_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            content_url TEXT NOT NULL,
            track_type TEXT NOT NULL,
            destination BLOB NOT NULL,
            status TEXT NOT NULL,
            resume_checkpoint TEXT,
            PRIMARY KEY (dtg_item_id, content_url),
            FOREIGN KEY (dtg_item_id) REFERENCES download_items(dtg_item_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_item_tasks_position ON download_item_tasks(dtg_item_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
