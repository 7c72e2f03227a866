//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP client or filesystem types in any signature
//! - Transport control goes through `TransferControl`, never through handles
//!   into the transport's internals
//! - Repositories are intent-based, not generic CRUD

pub mod downloader;
pub mod observer;
pub mod task_state;
pub mod transport;

use thiserror::Error;

pub use downloader::{
    BackgroundCompletionHandler, DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_PROGRESS_INTERVAL,
    Downloader, DownloaderConfig,
};
pub use observer::{DownloaderObserver, NoopObserver, SessionRef, deliver};
pub use task_state::TaskStateRepositoryPort;
pub use transport::{
    FetchOutcome, FetchRequest, Interruption, ProgressSink, TransferControl, TransportPort,
    TransportSession,
};

/// Domain-specific errors for repository operations.
///
/// This error type abstracts away storage implementation details (e.g., `sqlx`
/// or `serde_json` errors) and provides a clean interface for callers.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend error (database, filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
