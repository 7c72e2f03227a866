//! Download domain types, events and errors.
//!
//! This module contains pure data types for the download system. No I/O,
//! networking, or runtime dependencies allowed.
//!
//! # Structure
//!
//! - `task` - Download item tasks, track types and resume checkpoints
//! - `state` - Per-task status and the aggregate `DownloaderState`
//! - `events` - Observer-facing events (`DownloaderEvent`)
//! - `errors` - Error types for downloader and transport operations
//! - `record` - Persisted layout used to restore a downloader after restart

pub mod errors;
pub mod events;
pub mod record;
pub mod state;
pub mod task;

// Re-export commonly used types
pub use errors::{DownloaderError, DownloaderResult, TransportError};
pub use events::DownloaderEvent;
pub use record::{ItemRecord, TaskRecord};
pub use state::{DownloaderState, TaskStatus, derive_state};
pub use task::{DownloadItemTask, ResumeCheckpoint, TrackType};
