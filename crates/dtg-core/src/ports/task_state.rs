//! Task state repository port definition.
//!
//! This port defines the interface for persisting per-item task state so a
//! downloader can be restored after the process is suspended or killed.
//!
//! # Design
//!
//! - Persists the `ItemRecord` layout only (tasks, checkpoints, statuses)
//! - Fine-grained progress stays in-memory (high churn, not worth persisting)
//! - Intent-based methods, not generic CRUD

use async_trait::async_trait;

use super::RepositoryError;
use crate::download::ItemRecord;

/// Port for persisting download item state.
///
/// # Usage
///
/// ```ignore
/// let repo: Arc<dyn TaskStateRepositoryPort> = /* ... */;
/// repo.save_item(&downloader.records()).await?;
/// let record = repo.load_item("item-1").await?;
/// ```
#[async_trait]
pub trait TaskStateRepositoryPort: Send + Sync {
    /// Insert or replace the record of an item.
    async fn save_item(&self, item: &ItemRecord) -> Result<(), RepositoryError>;

    /// Load the record of an item.
    ///
    /// Returns `RepositoryError::NotFound` if nothing was saved for it.
    async fn load_item(&self, dtg_item_id: &str) -> Result<ItemRecord, RepositoryError>;

    /// Remove an item's record (after completion or cancellation).
    async fn remove_item(&self, dtg_item_id: &str) -> Result<(), RepositoryError>;

    /// Ids of every saved item, sorted.
    async fn list_items(&self) -> Result<Vec<String>, RepositoryError>;
}
