//! Downloader port definition.
//!
//! This port is the control surface callers use for one download item.
//! Any concrete transport backend is hidden behind it.
//!
//! # Design
//!
//! - Control calls validate and mutate local state synchronously and return
//!   immediately; transfers run in the background
//! - `pause` is the only call that waits, until in-flight tasks quiesce
//! - Once cancelled, every control call fails with `InvalidState`

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::observer::DownloaderObserver;
use crate::download::{
    DownloadItemTask, DownloaderError, DownloaderResult, DownloaderState, ItemRecord,
};

/// Zero-argument callback supplied by the host after a background flush.
pub type BackgroundCompletionHandler = Box<dyn FnOnce() + Send + 'static>;

/// Default cap on concurrently active tasks.
pub const DEFAULT_MAX_CONCURRENT_TASKS: u32 = 4;

/// Default minimum interval between progress events of one task.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for creating a downloader.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// The dtg item id this downloader serves.
    pub dtg_item_id: String,
    /// Session identifier used to restore background sessions.
    pub session_identifier: String,
    /// Maximum concurrently active tasks.
    pub max_concurrent_download_item_tasks: u32,
    /// Minimum interval between progress events of one task.
    pub progress_interval: Duration,
}

impl DownloaderConfig {
    /// Create a new config for an item, deriving the session identifier.
    pub fn new(dtg_item_id: impl Into<String>) -> Self {
        let dtg_item_id = dtg_item_id.into();
        Self {
            session_identifier: format!("dtg.session.{dtg_item_id}"),
            dtg_item_id,
            max_concurrent_download_item_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Set the session identifier.
    #[must_use]
    pub fn with_session_identifier(mut self, session_identifier: impl Into<String>) -> Self {
        self.session_identifier = session_identifier.into();
        self
    }

    /// Set the maximum concurrent tasks.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: u32) -> Self {
        self.max_concurrent_download_item_tasks = max;
        self
    }

    /// Set the progress event interval.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Reject unusable configurations.
    pub fn validate(&self) -> DownloaderResult<()> {
        if self.max_concurrent_download_item_tasks == 0 {
            return Err(DownloaderError::invalid_config(
                "max_concurrent_download_item_tasks must be at least 1",
            ));
        }
        if self.dtg_item_id.trim().is_empty() {
            return Err(DownloaderError::invalid_config("dtg_item_id must not be empty"));
        }
        if self.session_identifier.trim().is_empty() {
            return Err(DownloaderError::invalid_config(
                "session_identifier must not be empty",
            ));
        }
        Ok(())
    }
}

/// Control surface of a downloader for one item.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Session identifier, used to restore and identify background sessions.
    fn session_identifier(&self) -> &str;

    /// The related dtg item id.
    fn dtg_item_id(&self) -> &str;

    /// Maximum concurrently active tasks.
    fn max_concurrent_download_item_tasks(&self) -> u32;

    /// Current aggregate state.
    fn state(&self) -> DownloaderState;

    /// Bind the observer. Only a weak handle is kept; rebinding replaces it.
    fn set_observer(&self, observer: &Arc<dyn DownloaderObserver>);

    /// Store the host's background completion handler.
    ///
    /// A handler still pending from an earlier flush is invoked first.
    fn set_background_completion_handler(&self, handler: BackgroundCompletionHandler);

    /// The transport finished delivering a background batch. The stored
    /// handler runs once every event of the batch reached the observer.
    fn background_events_flushed(&self);

    /// Start downloading in registration order. Only valid from `New`.
    fn start(&self) -> DownloaderResult<()>;

    /// Register more tasks. Valid from `Downloading`, `Paused` and `Idle`.
    fn add_download_item_tasks(&self, tasks: Vec<DownloadItemTask>) -> DownloaderResult<()>;

    /// Suspend every active task and wait until all of them quiesced.
    ///
    /// Returns the paused tasks with their checkpoints.
    async fn pause(&self) -> DownloaderResult<Vec<DownloadItemTask>>;

    /// Re-queue every paused task.
    fn resume(&self) -> DownloaderResult<()>;

    /// Abort everything and invalidate the session. Terminal.
    fn cancel(&self) -> DownloaderResult<()>;

    /// Invalidate the transport session. Terminal.
    fn invalidate_session(&self) -> DownloaderResult<()>;

    /// Replace the transport session handle, keeping state and tasks.
    fn refresh_session(&self) -> DownloaderResult<()>;

    /// Drop failed tasks from the registry so they can be resubmitted.
    fn clear_failed(&self) -> DownloaderResult<usize>;

    /// Persistable snapshot of every registered task.
    fn records(&self) -> ItemRecord;
}
