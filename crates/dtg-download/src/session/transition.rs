//! Effects produced by one session core command.

use dtg_core::download::{DownloadItemTask, DownloaderEvent};

use crate::limiter::Admission;
use crate::registry::TransitionError;

/// How a pending pause request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseResolution {
    /// Every active task quiesced. Carries the paused tasks.
    Completed(Vec<DownloadItemTask>),
    /// The downloader was cancelled before the pause completed.
    Interrupted,
}

/// Side effects the caller must carry out after a command.
///
/// `events` must be enqueued for delivery in order, before the lock that
/// produced them is released. `admissions` must each be handed to the
/// transport.
#[derive(Debug, Default)]
pub struct Transition {
    /// Events to deliver, in order.
    pub events: Vec<DownloaderEvent>,
    /// Tasks that just became active.
    pub admissions: Vec<Admission>,
    /// Set when the current pause batch resolved.
    pub pause: Option<PauseResolution>,
    /// The transport session must be invalidated.
    pub invalidate_session: bool,
    /// Number of in-flight transfers that were asked to abort.
    pub aborted: usize,
    /// Set when a transport report was discarded.
    pub ignored: Option<TransitionError>,
}
