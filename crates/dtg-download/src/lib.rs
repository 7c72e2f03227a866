//! Download scheduler for dtg items.
//!
//! One [`DownloaderImpl`] drives the tasks of one dtg item: it admits them in
//! registration order up to a concurrency cap, pauses and resumes them with
//! transport-supplied checkpoints, and delivers lifecycle events to a weakly
//! held observer in the order the underlying mutations happened.
//!
//! # Modules
//!
//! - `registry` - Task statuses and legal transitions
//! - `limiter` - Admission under the concurrency cap
//! - `progress` - Throttled, coalesced progress accounting
//! - `session` - The serialized state machine tying the above together
//! - `manager` - Locking, transfer spawning, dispatch and session lifecycle
//!
//! Transport and persistence are ports defined in `dtg-core`; reference
//! adapters live in `dtg-http` and `dtg-store`.

// Re-export core types for convenience
pub use dtg_core::download::{
    DownloadItemTask, DownloaderError, DownloaderEvent, DownloaderResult, DownloaderState,
    ItemRecord, ResumeCheckpoint, TaskRecord, TaskStatus, TrackType, TransportError,
};
pub use dtg_core::ports::{
    BackgroundCompletionHandler, Downloader, DownloaderConfig, DownloaderObserver, FetchOutcome,
    FetchRequest, ProgressSink, SessionRef, TaskStateRepositoryPort, TransferControl,
    TransportPort, TransportSession,
};

// Internal modules (pub(crate) to keep implementation private)
pub(crate) mod limiter;
pub(crate) mod progress;
pub(crate) mod registry;
pub(crate) mod session;

#[cfg(test)]
mod test_logs;

// Public API
mod manager;

pub use manager::DownloaderImpl;

