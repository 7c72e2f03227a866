//! Core domain types and port definitions for dtg.
//!
//! # Modules
//!
//! - [`download`] - Tasks, checkpoints, states, events, errors and persisted records
//! - [`ports`] - Transport, observer, downloader and repository traits
//!
//! This crate performs no I/O. The scheduler lives in `dtg-download`; the
//! reference adapters live in `dtg-http` and `dtg-store`.

#![deny(unused_crate_dependencies)]

pub mod download;
pub mod ports;

// Re-export commonly used types for convenience
pub use download::{
    DownloadItemTask, DownloaderError, DownloaderEvent, DownloaderResult, DownloaderState,
    ItemRecord, ResumeCheckpoint, TaskRecord, TaskStatus, TrackType, TransportError, derive_state,
};
pub use ports::{
    BackgroundCompletionHandler, Downloader, DownloaderConfig, DownloaderObserver, FetchOutcome,
    FetchRequest, Interruption, NoopObserver, ProgressSink, RepositoryError,
    SessionRef, TaskStateRepositoryPort, TransferControl, TransportPort, TransportSession,
};
