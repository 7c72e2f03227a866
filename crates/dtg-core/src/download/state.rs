//! Task status and aggregate downloader state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate state of a downloader (one per manager instance).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloaderState {
    /// Created but no task was ever admitted.
    #[default]
    New,
    /// At least one task is in flight (or about to be admitted).
    Downloading,
    /// Nothing in flight, at least one task paused.
    Paused,
    /// Every task finished; more tasks can still be added.
    Idle,
    /// Terminal. The session is invalidated and unusable.
    Cancelled,
}

impl DownloaderState {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Idle => "idle",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "downloading" => Some(Self::Downloading),
            "paused" => Some(Self::Paused),
            "idle" => Some(Self::Idle),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the state is the absorbing `Cancelled` state.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for DownloaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task status tracked by the task registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for admission.
    Pending,
    /// Admitted and handed to the transport.
    Active,
    /// Suspended with a captured checkpoint.
    Paused,
    /// Finished successfully.
    Completed,
    /// Failed; not retried at this layer.
    Failed,
}

impl TaskStatus {
    /// Convert to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed or failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the aggregate state from the task statuses.
///
/// `started` is false until the first `start()`; `cancelled` is absorbing.
pub fn derive_state<I>(statuses: I, started: bool, cancelled: bool) -> DownloaderState
where
    I: IntoIterator<Item = TaskStatus>,
{
    if cancelled {
        return DownloaderState::Cancelled;
    }
    if !started {
        return DownloaderState::New;
    }

    let mut any_paused = false;
    for status in statuses {
        match status {
            TaskStatus::Active | TaskStatus::Pending => return DownloaderState::Downloading,
            TaskStatus::Paused => any_paused = true,
            TaskStatus::Completed | TaskStatus::Failed => {}
        }
    }

    if any_paused {
        DownloaderState::Paused
    } else {
        DownloaderState::Idle
    }
}
