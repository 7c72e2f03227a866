//! Downloader error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::DownloaderState;

/// Failure reported by a transport adapter for a single transfer.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportError {
    /// Network/HTTP error during the transfer.
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// I/O error while writing the destination.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "`NotFound`", "`PermissionDenied`").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The transport session itself became unusable.
    #[error("Transport session invalidated: {message}")]
    SessionInvalidated {
        /// Detailed error message.
        message: String,
    },

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a session invalidated error.
    pub fn session_invalidated(message: impl Into<String>) -> Self {
        Self::SessionInvalidated {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether this error invalidates the whole session rather than one task.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionInvalidated { .. })
    }
}

/// Error type for downloader operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloaderError {
    /// Operation not valid from the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// State at the time of the call.
        state: DownloaderState,
        /// The rejected operation.
        operation: String,
    },

    /// A task with the same content URL is already registered.
    #[error("Duplicate task: {content_url}")]
    DuplicateTask {
        /// The colliding content URL.
        content_url: String,
    },

    /// A single transfer failed. Siblings are unaffected.
    #[error("Transfer of {content_url} failed: {source}")]
    Transport {
        /// The failed task.
        content_url: String,
        /// Adapter-reported cause.
        source: TransportError,
    },

    /// The transport session became invalid; the downloader is unusable.
    #[error("Fatal session error: {message}")]
    FatalSession {
        /// Detailed error message.
        message: String,
    },

    /// Rejected configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },

    /// No task with this content URL is registered.
    #[error("Task not found: {content_url}")]
    TaskNotFound {
        /// The unknown content URL.
        content_url: String,
    },
}

impl DownloaderError {
    /// Create an invalid state error.
    pub fn invalid_state(state: DownloaderState, operation: impl Into<String>) -> Self {
        Self::InvalidState {
            state,
            operation: operation.into(),
        }
    }

    /// Create a duplicate task error.
    pub fn duplicate_task(content_url: impl Into<String>) -> Self {
        Self::DuplicateTask {
            content_url: content_url.into(),
        }
    }

    /// Wrap a transport failure for a task.
    pub fn transport(content_url: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            content_url: content_url.into(),
            source,
        }
    }

    /// Create a fatal session error.
    pub fn fatal_session(message: impl Into<String>) -> Self {
        Self::FatalSession {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a task not found error.
    pub fn task_not_found(content_url: impl Into<String>) -> Self {
        Self::TaskNotFound {
            content_url: content_url.into(),
        }
    }

    /// Check if a caller can recover by resubmitting the task.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                source: TransportError::Network { .. } | TransportError::Io { .. },
                ..
            }
        )
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidState { state, operation } => {
                format!("Cannot {operation} a download that is {state}.")
            }
            Self::DuplicateTask { content_url } => {
                format!("'{content_url}' is already part of this download.")
            }
            Self::Transport {
                content_url,
                source: TransportError::Network {
                    status_code: Some(code),
                    ..
                },
            } => format!("Downloading '{content_url}' failed (HTTP {code})."),
            Self::Transport { content_url, .. } => {
                format!("Downloading '{content_url}' failed. You can try again.")
            }
            Self::FatalSession { .. } => {
                "The download session is no longer usable. Start a new download.".to_string()
            }
            Self::InvalidConfig { message } => format!("Invalid download settings: {message}"),
            Self::TaskNotFound { content_url } => {
                format!("'{content_url}' is not part of this download.")
            }
        }
    }
}

/// Convenience result type for downloader operations.
pub type DownloaderResult<T> = Result<T, DownloaderError>;
