//! Downloader implementation.
//!
//! This module provides the concrete implementation of `Downloader` for one
//! dtg item, with lease-based transfer tracking and a dedicated dispatch task
//! for observer delivery.
//!
//! # Architecture
//!
//! - **Session core**: pure state machine, mutated under one lock
//! - **Worker**: runs one transfer on the transport, reports back by lease
//! - **Dispatcher**: delivers events to the observer in enqueue order
//! - **Lifecycle**: session handle and background completion handler
//!
//! # Concurrency Model
//!
//! - Every mutation runs under `Inner::state`; events are enqueued before the
//!   lock is released, so delivery order equals mutation order
//! - Transfers are spawned after the lock is released
//! - Lease tokens prevent stale transport reports from being applied
//! - Observer callbacks never run under the lock

mod dispatcher;
mod lifecycle;
mod worker;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use dtg_core::download::{
    DownloadItemTask, DownloaderError, DownloaderResult, DownloaderState, ItemRecord,
    TransportError,
};
use dtg_core::ports::{
    BackgroundCompletionHandler, Downloader, DownloaderConfig, DownloaderObserver, FetchOutcome,
    ProgressSink, SessionRef, TransportPort,
};

use crate::limiter::Admission;
use crate::registry::{LeaseId, TransitionError};
use crate::session::{PauseResolution, SessionCore, Transition};

use dispatcher::EventDispatcher;
use lifecycle::SessionLifecycle;

/// Work left to do once the state lock is released.
struct Effects {
    admissions: Vec<Admission>,
    invalidate_session: bool,
    pause: Option<PauseResolution>,
}

/// State guarded by the session lock.
struct Shared {
    core: SessionCore,
    pause_waiters: Vec<oneshot::Sender<PauseResolution>>,
}

struct Inner {
    config: DownloaderConfig,
    session_ref: SessionRef,
    state: Mutex<Shared>,
    dispatcher: EventDispatcher,
    lifecycle: SessionLifecycle,
    runtime: Handle,
}

/// Downloader for one dtg item.
///
/// Must be created inside a Tokio runtime; transfers and observer delivery
/// run on that runtime. Cloning yields another handle to the same downloader.
#[derive(Clone)]
pub struct DownloaderImpl {
    inner: Arc<Inner>,
}

impl DownloaderImpl {
    /// Create a downloader in `New` with `tasks` registered in order.
    ///
    /// Fails with `DuplicateTask` if two tasks share a content URL, and with
    /// `FatalSession` if the transport session cannot be opened.
    pub fn new(
        config: DownloaderConfig,
        tasks: Vec<DownloadItemTask>,
        transport: Arc<dyn TransportPort>,
    ) -> DownloaderResult<Self> {
        config.validate()?;
        let core = SessionCore::new(
            tasks,
            config.max_concurrent_download_item_tasks,
            config.progress_interval,
        )?;
        Self::assemble(config, core, transport)
    }

    /// Recreate a downloader from a persisted record.
    ///
    /// The downloader starts in `New`. Tasks that were active or pending are
    /// admitted on `start`; paused tasks wait for `resume`.
    pub fn restore(
        config: DownloaderConfig,
        record: ItemRecord,
        transport: Arc<dyn TransportPort>,
    ) -> DownloaderResult<Self> {
        config.validate()?;
        if record.dtg_item_id != config.dtg_item_id {
            return Err(DownloaderError::invalid_config(format!(
                "record belongs to item {}, not {}",
                record.dtg_item_id, config.dtg_item_id
            )));
        }
        let core = SessionCore::restore(
            record.tasks,
            config.max_concurrent_download_item_tasks,
            config.progress_interval,
        )?;
        Self::assemble(config, core, transport)
    }

    fn assemble(
        config: DownloaderConfig,
        core: SessionCore,
        transport: Arc<dyn TransportPort>,
    ) -> DownloaderResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            DownloaderError::invalid_config("a downloader must be created inside a Tokio runtime")
        })?;
        let lifecycle = SessionLifecycle::open(transport, &config.session_identifier)?;
        let session_ref = SessionRef::new(&config.session_identifier, &config.dtg_item_id);
        let dispatcher = EventDispatcher::spawn(&runtime, session_ref.clone());

        tracing::info!(
            target: "dtg.download",
            item = %config.dtg_item_id,
            session = %config.session_identifier,
            tasks = core.records().len(),
            max_concurrent = config.max_concurrent_download_item_tasks,
            "Downloader created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                session_ref,
                state: Mutex::new(Shared {
                    core,
                    pause_waiters: Vec::new(),
                }),
                dispatcher,
                lifecycle,
                runtime,
            }),
        })
    }

    /// Identity passed to observer callbacks.
    pub fn session_ref(&self) -> &SessionRef {
        &self.inner.session_ref
    }

    /// Number of tasks currently transferring.
    pub fn active_count(&self) -> usize {
        self.inner.lock().core.active_count()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a core command and carry out its effects.
    fn command<F>(self: &Arc<Self>, operation: &'static str, f: F) -> DownloaderResult<()>
    where
        F: FnOnce(&mut SessionCore) -> DownloaderResult<Transition>,
    {
        let effects = {
            let mut shared = self.lock();
            let transition = f(&mut shared.core).inspect_err(|e| {
                tracing::debug!(
                    target: "dtg.download",
                    item = %self.config.dtg_item_id,
                    operation,
                    error = %e,
                    "Command rejected"
                );
            })?;
            Self::commit(&self.dispatcher, &mut shared, transition)
        };
        self.apply(effects);
        Ok(())
    }

    /// Enqueue events and resolve pause waiters. Called with the lock held.
    fn commit(dispatcher: &EventDispatcher, shared: &mut Shared, transition: Transition) -> Effects {
        let Transition {
            events,
            admissions,
            pause,
            invalidate_session,
            aborted,
            ignored,
        } = transition;

        if let Some(reason) = ignored {
            log_ignored(&reason);
        }
        if aborted > 0 {
            tracing::debug!(target: "dtg.download", aborted, "Requested abort of in-flight transfers");
        }

        dispatcher.enqueue(events);

        if let Some(resolution) = &pause {
            for waiter in shared.pause_waiters.drain(..) {
                let _ = waiter.send(resolution.clone());
            }
        }

        Effects {
            admissions,
            invalidate_session,
            pause,
        }
    }

    /// Carry out effects after the lock is released.
    fn apply(self: &Arc<Self>, effects: Effects) -> Option<PauseResolution> {
        if effects.invalidate_session {
            self.lifecycle.invalidate();
            self.flush_completion_handler();
            tracing::info!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                session = %self.config.session_identifier,
                "Transport session invalidated"
            );
        }
        if let Some(PauseResolution::Completed(tasks)) = &effects.pause {
            tracing::info!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                paused = tasks.len(),
                "Pause completed"
            );
        }
        self.spawn_transfers(effects.admissions);
        effects.pause
    }

    fn spawn_transfers(self: &Arc<Self>, admissions: Vec<Admission>) {
        if admissions.is_empty() {
            return;
        }
        let session = self.lifecycle.current();
        for admission in admissions {
            let key = admission.task.key().to_string();
            let lease = admission.lease;
            tracing::debug!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                url = %key,
                lease = %lease,
                resume_offset = admission.task.resume_checkpoint.as_ref().map(|c| c.offset),
                "Starting transfer"
            );

            let weak = Arc::downgrade(self);
            let progress = {
                let weak = weak.clone();
                let key = key.clone();
                ProgressSink::new(move |bytes| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_progress(&key, lease, bytes);
                    }
                })
            };
            let session = Arc::clone(&session);
            self.runtime.spawn(async move {
                let result = worker::run_transfer(session, admission, progress).await;
                if let Some(inner) = weak.upgrade() {
                    inner.on_transfer_finished(&key, lease, result);
                }
            });
        }
    }

    fn on_progress(&self, content_url: &str, lease: LeaseId, bytes: u64) {
        let mut shared = self.lock();
        if let Some(event) = shared.core.on_progress(content_url, lease, bytes) {
            self.dispatcher.enqueue([event]);
        }
    }

    fn on_transfer_finished(
        self: &Arc<Self>,
        content_url: &str,
        lease: LeaseId,
        result: Result<FetchOutcome, TransportError>,
    ) {
        match &result {
            Ok(outcome) => tracing::debug!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                url = %content_url,
                lease = %lease,
                outcome = ?outcome,
                "Transfer finished"
            ),
            Err(e) if e.is_fatal() => tracing::error!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                url = %content_url,
                error = %e,
                "Transport session failed"
            ),
            Err(e) => tracing::warn!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                url = %content_url,
                error = %e,
                "Transfer failed"
            ),
        }

        let effects = {
            let mut shared = self.lock();
            let transition = shared.core.on_transfer_finished(content_url, lease, result);
            Self::commit(&self.dispatcher, &mut shared, transition)
        };
        self.apply(effects);
    }

    fn flush_completion_handler(&self) {
        if let Some(handler) = self.lifecycle.take_completion_handler() {
            self.dispatcher.run_after_pending(handler);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let aborted = shared.core.abort_in_flight();
        if let Some(handler) = self.lifecycle.take_completion_handler() {
            handler();
        }
        if aborted > 0 {
            tracing::info!(
                target: "dtg.download",
                item = %self.config.dtg_item_id,
                aborted,
                "Downloader dropped, aborted in-flight transfers"
            );
        }
    }
}

fn log_ignored(reason: &TransitionError) {
    match reason {
        TransitionError::Illegal { .. } => {
            tracing::warn!(target: "dtg.download", %reason, "Rejected task transition");
        }
        TransitionError::StaleLease { .. } | TransitionError::UnknownTask { .. } => {
            tracing::warn!(target: "dtg.download", %reason, "Ignoring stale transport report");
        }
    }
}

#[async_trait]
impl Downloader for DownloaderImpl {
    fn session_identifier(&self) -> &str {
        &self.inner.config.session_identifier
    }

    fn dtg_item_id(&self) -> &str {
        &self.inner.config.dtg_item_id
    }

    fn max_concurrent_download_item_tasks(&self) -> u32 {
        self.inner.config.max_concurrent_download_item_tasks
    }

    fn state(&self) -> DownloaderState {
        self.inner.lock().core.state()
    }

    fn set_observer(&self, observer: &Arc<dyn DownloaderObserver>) {
        self.inner.dispatcher.bind(observer);
    }

    fn set_background_completion_handler(&self, handler: BackgroundCompletionHandler) {
        if let Some(previous) = self.inner.lifecycle.store_completion_handler(handler) {
            tracing::debug!(
                target: "dtg.download",
                item = %self.inner.config.dtg_item_id,
                "Replacing pending background completion handler"
            );
            self.inner.dispatcher.run_after_pending(previous);
        }
        // Nothing will flush a cancelled downloader.
        if self.state().is_cancelled() {
            self.inner.flush_completion_handler();
        }
    }

    fn background_events_flushed(&self) {
        tracing::debug!(
            target: "dtg.download",
            item = %self.inner.config.dtg_item_id,
            "Background events flushed"
        );
        self.inner.flush_completion_handler();
    }

    fn start(&self) -> DownloaderResult<()> {
        self.inner.command("start", SessionCore::start)?;
        tracing::info!(target: "dtg.download", item = %self.inner.config.dtg_item_id, "Downloader started");
        Ok(())
    }

    fn add_download_item_tasks(&self, tasks: Vec<DownloadItemTask>) -> DownloaderResult<()> {
        let count = tasks.len();
        self.inner
            .command("add download item tasks", |core| core.add_tasks(tasks))?;
        tracing::info!(
            target: "dtg.download",
            item = %self.inner.config.dtg_item_id,
            count,
            "Added download item tasks"
        );
        Ok(())
    }

    async fn pause(&self) -> DownloaderResult<Vec<DownloadItemTask>> {
        let (effects, waiter) = {
            let mut shared = self.inner.lock();
            let transition = shared.core.pause()?;
            let waiter = transition.pause.is_none().then(|| {
                let (tx, rx) = oneshot::channel();
                shared.pause_waiters.push(tx);
                rx
            });
            let effects = Inner::commit(&self.inner.dispatcher, &mut shared, transition);
            (effects, waiter)
        };
        let immediate = self.inner.apply(effects);

        let resolution = match waiter {
            Some(rx) => {
                tracing::debug!(
                    target: "dtg.download",
                    item = %self.inner.config.dtg_item_id,
                    "Waiting for active tasks to suspend"
                );
                rx.await.unwrap_or(PauseResolution::Interrupted)
            }
            None => immediate.unwrap_or(PauseResolution::Completed(Vec::new())),
        };

        match resolution {
            PauseResolution::Completed(tasks) => Ok(tasks),
            PauseResolution::Interrupted => Err(DownloaderError::invalid_state(
                DownloaderState::Cancelled,
                "pause",
            )),
        }
    }

    fn resume(&self) -> DownloaderResult<()> {
        self.inner.command("resume", SessionCore::resume)?;
        tracing::info!(target: "dtg.download", item = %self.inner.config.dtg_item_id, "Downloader resumed");
        Ok(())
    }

    fn cancel(&self) -> DownloaderResult<()> {
        self.inner.command("cancel", SessionCore::cancel)?;
        tracing::info!(target: "dtg.download", item = %self.inner.config.dtg_item_id, "Downloader cancelled");
        Ok(())
    }

    fn invalidate_session(&self) -> DownloaderResult<()> {
        self.inner.command("invalidate session", SessionCore::invalidate)
    }

    fn refresh_session(&self) -> DownloaderResult<()> {
        // Held across the reopen so a concurrent cancel cannot interleave.
        let shared = self.inner.lock();
        shared.core.refresh()?;
        self.inner.lifecycle.refresh()?;
        drop(shared);
        tracing::info!(
            target: "dtg.download",
            item = %self.inner.config.dtg_item_id,
            session = %self.inner.config.session_identifier,
            "Transport session refreshed"
        );
        Ok(())
    }

    fn clear_failed(&self) -> DownloaderResult<usize> {
        let removed = self.inner.lock().core.clear_failed()?;
        tracing::info!(
            target: "dtg.download",
            item = %self.inner.config.dtg_item_id,
            removed,
            "Cleared failed tasks"
        );
        Ok(removed)
    }

    fn records(&self) -> ItemRecord {
        let tasks = self.inner.lock().core.records();
        ItemRecord::new(
            &self.inner.config.dtg_item_id,
            &self.inner.config.session_identifier,
            tasks,
        )
    }
}
