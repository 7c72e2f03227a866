//! `SQLite` persistence for dtg download items.
//!
//! Implements `TaskStateRepositoryPort` so a host can save an item's task
//! layout (statuses, checkpoints, registration order) and rebuild a
//! downloader from it after a restart.
//!
//! ```rust,no_run
//! use dtg_core::{Downloader, TaskStateRepositoryPort};
//! use dtg_store::{SqliteTaskStateRepository, setup_database};
//! # async fn example(downloader: &dyn Downloader) -> anyhow::Result<()> {
//! let pool = setup_database(std::path::Path::new("/var/lib/dtg/state.db")).await?;
//! let repo = SqliteTaskStateRepository::new(pool);
//! repo.save_item(&downloader.records()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod repositories;
pub mod setup;

pub use repositories::SqliteTaskStateRepository;

pub use setup::setup_database;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
