//! Internal error types for HTTP transfers.
//!
//! These errors are internal to `dtg-http` and are mapped to the core
//! `TransportError` at the boundary.

use std::path::PathBuf;

use dtg_core::TransportError;
use thiserror::Error;

/// Result type alias for HTTP transfer operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors raised while running one HTTP transfer.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The server answered with a non-success status.
    #[error("HTTP request failed with status {status}: {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// A partial response started somewhere other than the requested offset.
    #[error("Partial response for {url} starts at byte {actual}, expected {expected}")]
    ContentRange {
        /// Requested start byte
        expected: u64,
        /// Start byte the server sent
        actual: u64,
        /// The URL that was requested
        url: String,
    },

    /// Network or HTTP client error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading or writing the destination failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The destination path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

impl HttpError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status { status, url } => TransportError::network_with_status(
                format!("request for {url} failed with status {status}"),
                status,
            ),
            err @ HttpError::ContentRange { .. } => TransportError::network(err.to_string()),
            HttpError::Network(e) => match e.status() {
                Some(status) => TransportError::network_with_status(e.to_string(), status.as_u16()),
                None => TransportError::network(e.to_string()),
            },
            HttpError::Io { source, .. } => TransportError::from_io_error(&source),
        }
    }
}
