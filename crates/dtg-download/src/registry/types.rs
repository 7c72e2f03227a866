//! Registry entry types (internal implementation).
//!
//! These types are used internally by the registry state machine.
//! For persistence, convert to `dtg_core::download::TaskRecord`.

use std::fmt;

use dtg_core::download::{DownloadItemTask, DownloaderError, TaskRecord, TaskStatus};
use dtg_core::ports::TransferControl;

/// Lease id for tracking one admission of a task.
///
/// Every time a task becomes active it gets a fresh lease. Transport reports
/// carrying an older lease are stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(u64);

impl LeaseId {
    /// Wrap a raw lease number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binding between an active task and its in-flight transfer.
#[derive(Clone, Debug)]
pub struct ActiveTransfer {
    /// Lease of the current admission.
    pub lease: LeaseId,
    /// Suspend/abort handle shared with the transport.
    pub control: TransferControl,
}

/// A registered task together with its scheduling status.
#[derive(Clone, Debug)]
pub struct TaskEntry {
    /// The task, including its latest resume checkpoint.
    pub task: DownloadItemTask,
    /// Current scheduling status.
    pub status: TaskStatus,
    /// Set while the task is active.
    pub transfer: Option<ActiveTransfer>,
    /// Last failure, set while the task is failed.
    pub error: Option<DownloaderError>,
}

impl TaskEntry {
    /// Create a new entry in the given status.
    pub const fn new(task: DownloadItemTask, status: TaskStatus) -> Self {
        Self {
            task,
            status,
            transfer: None,
            error: None,
        }
    }

    /// Lease of the in-flight transfer, if the task is active.
    pub fn lease(&self) -> Option<LeaseId> {
        self.transfer.as_ref().map(|t| t.lease)
    }

    /// Convert to a persistable record.
    pub fn to_record(&self) -> TaskRecord {
        TaskRecord::new(&self.task, self.status)
    }
}
