//! Transport adapter port definition.
//!
//! The transport performs one resumable fetch per admitted task. The core
//! never talks HTTP or touches the filesystem; it only hands out
//! `FetchRequest`s and interprets `FetchOutcome`s.
//!
//! # Control
//!
//! Every fetch carries a `TransferControl` with two independent signals:
//!
//! - *suspend*: stop as soon as possible, keep the partial data and return
//!   `FetchOutcome::Suspended` with the checkpoint to resume from
//! - *abort*: stop, discard partial data and return `FetchOutcome::Aborted`
//!
//! Abort wins when both are raised.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::download::{DownloadItemTask, ResumeCheckpoint, TransportError};

/// How a transfer was interrupted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interruption {
    /// Suspension requested; resume data must be preserved.
    Suspend,
    /// Abort requested; resume data must be discarded.
    Abort,
}

/// Suspend/abort signals for one in-flight transfer.
#[derive(Clone, Debug, Default)]
pub struct TransferControl {
    suspend: CancellationToken,
    abort: CancellationToken,
}

impl TransferControl {
    /// Create a fresh control with neither signal raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the transfer to suspend.
    pub fn request_suspend(&self) {
        self.suspend.cancel();
    }

    /// Ask the transfer to abort.
    pub fn request_abort(&self) {
        self.abort.cancel();
    }

    /// Whether suspension was requested.
    #[must_use]
    pub fn is_suspend_requested(&self) -> bool {
        self.suspend.is_cancelled()
    }

    /// Whether abort was requested.
    #[must_use]
    pub fn is_abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// The pending interruption, if any. Abort takes precedence.
    #[must_use]
    pub fn interruption(&self) -> Option<Interruption> {
        if self.is_abort_requested() {
            Some(Interruption::Abort)
        } else if self.is_suspend_requested() {
            Some(Interruption::Suspend)
        } else {
            None
        }
    }

    /// Wait until either signal is raised.
    pub async fn interrupted(&self) -> Interruption {
        tokio::select! {
            biased;

            () = self.abort.cancelled() => Interruption::Abort,
            () = self.suspend.cancelled() => {
                if self.is_abort_requested() {
                    Interruption::Abort
                } else {
                    Interruption::Suspend
                }
            }
        }
    }
}

/// Callback receiving byte increments for one transfer.
#[derive(Clone)]
pub struct ProgressSink(Arc<dyn Fn(u64) + Send + Sync>);

impl ProgressSink {
    /// Wrap a callback.
    pub fn new(f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A sink that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report `bytes` newly written to the destination.
    pub fn report(&self, bytes: u64) {
        if bytes > 0 {
            (self.0)(bytes);
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressSink")
    }
}

/// Everything a transport needs to run one transfer.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// The task to fetch.
    pub task: DownloadItemTask,
    /// Where to resume from; `None` starts from zero.
    pub resume_checkpoint: Option<ResumeCheckpoint>,
    /// Suspend/abort signals.
    pub control: TransferControl,
    /// Progress callback.
    pub progress: ProgressSink,
}

/// Terminal outcome of a transfer that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// All bytes are at the destination. Any checkpoint is obsolete.
    Completed,
    /// Stopped on request; resume from the checkpoint.
    ///
    /// `None` when the transfer stopped before anything was fetched for a
    /// task that had no checkpoint, so the task still starts from zero.
    Suspended(Option<ResumeCheckpoint>),
    /// Stopped on request; partial data discarded.
    Aborted,
}

/// A live transport session (one per downloader at a time).
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Identifier the session was opened with.
    fn identifier(&self) -> &str;

    /// Run one transfer to a terminal outcome.
    ///
    /// Per-task failures are `Err`; `TransportError::SessionInvalidated`
    /// signals that the whole session is unusable.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, TransportError>;

    /// Invalidate the session. Subsequent fetches must fail with
    /// `TransportError::SessionInvalidated`.
    fn invalidate(&self);

    /// Whether the session can still run transfers.
    fn is_valid(&self) -> bool;
}

/// Factory for transport sessions.
pub trait TransportPort: Send + Sync {
    /// Open (or reattach to) the session with this identifier.
    fn open_session(
        &self,
        session_identifier: &str,
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}
