//! Downloader observer port.
//!
//! A downloader delivers its lifecycle notifications to at most one bound
//! observer. Delivery is serialized: no two callbacks of the same downloader
//! ever run concurrently.
//!
//! The downloader only keeps a non-owning handle to the observer. When the
//! owner drops the observer, events are silently discarded.

use serde::{Deserialize, Serialize};

use crate::download::{DownloadItemTask, DownloaderError, DownloaderEvent, DownloaderState};

/// Identity of the downloader that produced an event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef {
    /// Transport session identifier.
    pub session_identifier: String,
    /// The dtg item id.
    pub dtg_item_id: String,
}

impl SessionRef {
    /// Create a new session reference.
    pub fn new(session_identifier: impl Into<String>, dtg_item_id: impl Into<String>) -> Self {
        Self {
            session_identifier: session_identifier.into(),
            dtg_item_id: dtg_item_id.into(),
        }
    }
}

/// Receives downloader notifications.
///
/// Every method has an empty default so observers implement only what they
/// need. Callbacks run on the downloader's dispatch task and should return
/// quickly.
#[allow(unused_variables)]
pub trait DownloaderObserver: Send + Sync {
    /// `bytes_written` new bytes were transferred for `content_url`.
    ///
    /// Increments count bytes received, not the size on disk: when a resumed
    /// transfer has to restart, the bytes fetched before are counted again.
    fn did_progress(&self, downloader: &SessionRef, content_url: &str, bytes_written: u64) {}

    /// A pause completed. `tasks` carry their checkpoints for persistence.
    fn did_pause_download_tasks(&self, downloader: &SessionRef, tasks: &[DownloadItemTask]) {}

    /// The downloader was cancelled.
    fn did_cancel_download_tasks(&self, downloader: &SessionRef) {}

    /// A task finished successfully.
    fn did_finish_downloading(&self, downloader: &SessionRef, task: &DownloadItemTask) {}

    /// The aggregate state changed.
    fn did_change_to_state(&self, downloader: &SessionRef, new_state: DownloaderState) {}

    /// The transport session became invalid.
    fn did_become_invalid(&self, downloader: &SessionRef, error: Option<&DownloaderError>) {}

    /// A task failed.
    fn did_fail_with_error(
        &self,
        downloader: &SessionRef,
        task: &DownloadItemTask,
        error: &DownloaderError,
    ) {
    }
}

/// Route an event to the matching observer callback.
pub fn deliver(observer: &dyn DownloaderObserver, downloader: &SessionRef, event: &DownloaderEvent) {
    match event {
        DownloaderEvent::Progress {
            content_url,
            bytes_written,
        } => observer.did_progress(downloader, content_url, *bytes_written),
        DownloaderEvent::TasksPaused { tasks } => {
            observer.did_pause_download_tasks(downloader, tasks);
        }
        DownloaderEvent::TasksCancelled => observer.did_cancel_download_tasks(downloader),
        DownloaderEvent::TaskFinished { task } => observer.did_finish_downloading(downloader, task),
        DownloaderEvent::StateChanged { state } => observer.did_change_to_state(downloader, *state),
        DownloaderEvent::BecameInvalid { error } => {
            observer.did_become_invalid(downloader, error.as_ref());
        }
        DownloaderEvent::TaskFailed { task, error } => {
            observer.did_fail_with_error(downloader, task, error);
        }
    }
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DownloaderObserver for NoopObserver {}
