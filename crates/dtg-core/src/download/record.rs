//! Persisted layout of a download item.
//!
//! Enough to reconstruct the task registry after a process restart. The core
//! produces these records but never writes them itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use super::state::TaskStatus;
use super::task::{DownloadItemTask, ResumeCheckpoint, TrackType};

/// Persisted form of one task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Registry key.
    pub content_url: Url,
    /// Track classification.
    pub track_type: TrackType,
    /// Local destination.
    pub destination_url: PathBuf,
    /// Latest captured checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_checkpoint: Option<ResumeCheckpoint>,
    /// Status at the time the record was taken.
    pub status: TaskStatus,
}

impl TaskRecord {
    /// Build a record from a task and its status.
    #[must_use]
    pub fn new(task: &DownloadItemTask, status: TaskStatus) -> Self {
        Self {
            content_url: task.content_url.clone(),
            track_type: task.track_type,
            destination_url: task.destination_url.clone(),
            resume_checkpoint: task.resume_checkpoint.clone(),
            status,
        }
    }

    /// Convert back into a task, keeping the checkpoint.
    #[must_use]
    pub fn into_task(self) -> DownloadItemTask {
        DownloadItemTask {
            content_url: self.content_url,
            track_type: self.track_type,
            destination_url: self.destination_url,
            resume_checkpoint: self.resume_checkpoint,
        }
    }
}

/// Persisted form of a whole item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// The dtg item id.
    pub dtg_item_id: String,
    /// Session identifier used to correlate a restored transport session.
    pub session_identifier: String,
    /// Tasks in registration order.
    pub tasks: Vec<TaskRecord>,
    /// When the record was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        dtg_item_id: impl Into<String>,
        session_identifier: impl Into<String>,
        tasks: Vec<TaskRecord>,
    ) -> Self {
        Self {
            dtg_item_id: dtg_item_id.into(),
            session_identifier: session_identifier.into(),
            tasks,
            saved_at: Some(Utc::now()),
        }
    }

    /// Number of tasks with the given status.
    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Whether every task is completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }
}
