//! Task registry.
//!
//! This module provides a pure state machine for the tasks of one download
//! item. No I/O is performed here; the session core drives it.
//!
//! # Design
//!
//! - Pure synchronous state machine (no async, no IO, no tracing)
//! - Tasks are keyed by content URL and iterate in registration order
//! - Only legal status transitions are accepted; everything else is rejected
//!   with a `TransitionError` and leaves the registry unchanged
//!
//! # Transitions
//!
//! ```text
//! pending -> active -> completed | failed | paused
//! pending -> paused -> pending
//! ```

mod types;

use indexmap::IndexMap;
use thiserror::Error;

use dtg_core::download::{
    DownloadItemTask, DownloaderError, ResumeCheckpoint, TaskRecord, TaskStatus,
};

pub use types::{ActiveTransfer, LeaseId, TaskEntry};

/// Rejected registry transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// No task is registered under this URL.
    #[error("Unknown task: {content_url}")]
    UnknownTask { content_url: String },

    /// The task is not in a status the transition starts from.
    #[error("Illegal transition for {content_url}: {from} -> {to}")]
    Illegal {
        content_url: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// The report belongs to an earlier admission of the task.
    #[error("Stale lease {lease} for {content_url}")]
    StaleLease { content_url: String, lease: LeaseId },
}

/// Tasks of one item with their scheduling status.
///
/// This is a sync type with no internal locking; the caller is responsible
/// for synchronization.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    entries: IndexMap<String, TaskEntry>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register tasks as pending.
    ///
    /// All-or-nothing: if any URL is already registered, or appears twice in
    /// `tasks`, nothing is inserted.
    pub fn register(&mut self, tasks: Vec<DownloadItemTask>) -> Result<(), DownloaderError> {
        let records = tasks
            .into_iter()
            .map(|task| TaskRecord::new(&task, TaskStatus::Pending))
            .collect();
        self.register_records(records)
    }

    /// Register tasks with explicit statuses, as restored from a record.
    ///
    /// Active tasks are re-queued as pending since no transfer backs them.
    pub fn register_records(&mut self, records: Vec<TaskRecord>) -> Result<(), DownloaderError> {
        let mut seen = std::collections::HashSet::with_capacity(records.len());
        for record in &records {
            let key = record.content_url.as_str();
            if self.entries.contains_key(key) || !seen.insert(key) {
                return Err(DownloaderError::duplicate_task(key));
            }
        }

        for record in records {
            let status = match record.status {
                TaskStatus::Active => TaskStatus::Pending,
                other => other,
            };
            let task = record.into_task();
            self.entries
                .insert(task.key().to_string(), TaskEntry::new(task, status));
        }
        Ok(())
    }

    /// Look up a task.
    pub fn get(&self, content_url: &str) -> Option<&TaskEntry> {
        self.entries.get(content_url)
    }

    /// Number of tasks in a status.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.entries.values().filter(|e| e.status == status).count()
    }

    /// Number of active tasks.
    pub fn active_count(&self) -> usize {
        self.count(TaskStatus::Active)
    }

    /// Every entry, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskEntry> + '_ {
        self.entries.values()
    }

    /// Statuses of every task, in registration order.
    pub fn statuses(&self) -> impl Iterator<Item = TaskStatus> + '_ {
        self.entries.values().map(|e| e.status)
    }

    /// First pending task in registration order.
    pub fn next_pending(&self) -> Option<&DownloadItemTask> {
        self.entries
            .values()
            .find(|e| e.status == TaskStatus::Pending)
            .map(|e| &e.task)
    }

    /// Transfers of every active task.
    pub fn active_transfers(&self) -> impl Iterator<Item = &ActiveTransfer> + '_ {
        self.entries.values().filter_map(|e| e.transfer.as_ref())
    }

    /// Persistable snapshot of every task, in registration order.
    pub fn records(&self) -> Vec<TaskRecord> {
        self.entries.values().map(TaskEntry::to_record).collect()
    }

    /// Pending -> active.
    pub fn activate(
        &mut self,
        content_url: &str,
        transfer: ActiveTransfer,
    ) -> Result<&DownloadItemTask, TransitionError> {
        let entry = self.expect_status(content_url, TaskStatus::Pending, TaskStatus::Active)?;
        entry.status = TaskStatus::Active;
        entry.transfer = Some(transfer);
        entry.error = None;
        Ok(&entry.task)
    }

    /// Active -> completed. The resume checkpoint is cleared.
    pub fn complete(
        &mut self,
        content_url: &str,
        lease: LeaseId,
    ) -> Result<DownloadItemTask, TransitionError> {
        let entry = self.expect_lease(content_url, lease, TaskStatus::Completed)?;
        entry.status = TaskStatus::Completed;
        entry.transfer = None;
        entry.task.resume_checkpoint = None;
        Ok(entry.task.clone())
    }

    /// Active -> failed.
    pub fn fail(
        &mut self,
        content_url: &str,
        lease: LeaseId,
        error: DownloaderError,
    ) -> Result<DownloadItemTask, TransitionError> {
        let entry = self.expect_lease(content_url, lease, TaskStatus::Failed)?;
        entry.status = TaskStatus::Failed;
        entry.transfer = None;
        entry.error = Some(error);
        Ok(entry.task.clone())
    }

    /// Active -> paused, recording the transport's checkpoint.
    pub fn suspend(
        &mut self,
        content_url: &str,
        lease: LeaseId,
        checkpoint: Option<ResumeCheckpoint>,
    ) -> Result<DownloadItemTask, TransitionError> {
        let entry = self.expect_lease(content_url, lease, TaskStatus::Paused)?;
        entry.status = TaskStatus::Paused;
        entry.transfer = None;
        entry.task.resume_checkpoint = checkpoint;
        Ok(entry.task.clone())
    }

    /// Every pending task -> paused. Checkpoints stay as they are.
    ///
    /// Returns the paused tasks in registration order.
    pub fn pause_pending(&mut self) -> Vec<DownloadItemTask> {
        self.entries
            .values_mut()
            .filter(|e| e.status == TaskStatus::Pending)
            .map(|e| {
                e.status = TaskStatus::Paused;
                e.task.clone()
            })
            .collect()
    }

    /// Every paused task -> pending. Returns how many were re-queued.
    pub fn resume_paused(&mut self) -> usize {
        let mut resumed = 0;
        for entry in self.entries.values_mut() {
            if entry.status == TaskStatus::Paused {
                entry.status = TaskStatus::Pending;
                resumed += 1;
            }
        }
        resumed
    }

    /// Remove failed tasks so their URLs can be registered again.
    pub fn remove_failed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.status != TaskStatus::Failed);
        before - self.entries.len()
    }

    /// Remove every task, returning the transfers that were still in flight.
    pub fn clear(&mut self) -> Vec<ActiveTransfer> {
        self.entries
            .drain(..)
            .filter_map(|(_, e)| e.transfer)
            .collect()
    }

    fn expect_status(
        &mut self,
        content_url: &str,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<&mut TaskEntry, TransitionError> {
        let entry = self
            .entries
            .get_mut(content_url)
            .ok_or_else(|| TransitionError::UnknownTask {
                content_url: content_url.to_string(),
            })?;
        if entry.status != from {
            return Err(TransitionError::Illegal {
                content_url: content_url.to_string(),
                from: entry.status,
                to,
            });
        }
        Ok(entry)
    }

    fn expect_lease(
        &mut self,
        content_url: &str,
        lease: LeaseId,
        to: TaskStatus,
    ) -> Result<&mut TaskEntry, TransitionError> {
        let entry = self.expect_status(content_url, TaskStatus::Active, to)?;
        if entry.lease() != Some(lease) {
            return Err(TransitionError::StaleLease {
                content_url: content_url.to_string(),
                lease,
            });
        }
        Ok(entry)
    }
}
