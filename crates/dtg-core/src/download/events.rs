//! Downloader events - discriminated union for everything the observer sees.

use serde::{Deserialize, Serialize};

use super::errors::DownloaderError;
use super::state::DownloaderState;
use super::task::DownloadItemTask;

/// Single discriminated union for all downloader events.
///
/// Each variant corresponds to exactly one observer callback. Events are
/// generated inside the serialized mutation domain and delivered in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloaderEvent {
    /// Bytes written since the previous progress event for this task.
    Progress {
        /// The task that made progress.
        content_url: String,
        /// Byte increment.
        bytes_written: u64,
    },

    /// A pause batch completed; carries the paused tasks with checkpoints.
    TasksPaused {
        /// Paused tasks, in registration order.
        tasks: Vec<DownloadItemTask>,
    },

    /// The downloader was cancelled.
    TasksCancelled,

    /// A task finished successfully.
    TaskFinished {
        /// The finished task.
        task: DownloadItemTask,
    },

    /// The aggregate state changed.
    StateChanged {
        /// The new state.
        state: DownloaderState,
    },

    /// The transport session became invalid.
    BecameInvalid {
        /// Cause, or `None` for an explicit invalidation.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<DownloaderError>,
    },

    /// A task failed.
    TaskFailed {
        /// The failed task.
        task: DownloadItemTask,
        /// Why it failed.
        error: DownloaderError,
    },
}

impl DownloaderEvent {
    /// Create a progress event.
    pub fn progress(content_url: impl Into<String>, bytes_written: u64) -> Self {
        Self::Progress {
            content_url: content_url.into(),
            bytes_written,
        }
    }

    /// Create a state changed event.
    #[must_use]
    pub const fn state_changed(state: DownloaderState) -> Self {
        Self::StateChanged { state }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::TasksPaused { .. } => "tasks_paused",
            Self::TasksCancelled => "tasks_cancelled",
            Self::TaskFinished { .. } => "task_finished",
            Self::StateChanged { .. } => "state_changed",
            Self::BecameInvalid { .. } => "became_invalid",
            Self::TaskFailed { .. } => "task_failed",
        }
    }

    /// Whether this is a per-task terminal event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskFinished { .. } | Self::TaskFailed { .. })
    }
}
