//! Session state machine.
//!
//! `SessionCore` owns the registry, the limiter and the published aggregate
//! state of one downloader. Every control call and every transport report is
//! a command on it; each command returns a [`Transition`] describing the
//! events to deliver and the transfers to start.
//!
//! # Design
//!
//! - Synchronous, no I/O, no tracing. The manager serializes access.
//! - The published state only changes inside `publish`, which emits exactly
//!   one `StateChanged` per realized change.
//! - Transport reports are matched against the lease of the admission they
//!   belong to; anything else is discarded, so every admission yields at
//!   most one terminal event.
//! - Interrupting a transfer only flips its `TransferControl`; the transfer
//!   reacts on its own task and reports back through `on_transfer_finished`.

mod transition;

use std::collections::HashSet;
use std::time::Duration;

use dtg_core::download::{
    DownloadItemTask, DownloaderError, DownloaderEvent, DownloaderResult, DownloaderState,
    TaskRecord, TaskStatus, TransportError, derive_state,
};
use dtg_core::ports::FetchOutcome;

use crate::limiter::ConcurrencyLimiter;
use crate::progress::ProgressLedger;
use crate::registry::{LeaseId, TaskRegistry, TransitionError};

pub use transition::{PauseResolution, Transition};

/// Tasks collected by an in-progress pause.
#[derive(Debug, Default)]
struct PauseBatch {
    keys: HashSet<String>,
}

/// Serialized state of one downloader.
#[derive(Debug)]
pub struct SessionCore {
    registry: TaskRegistry,
    limiter: ConcurrencyLimiter,
    progress: ProgressLedger,
    started: bool,
    cancelled: bool,
    published: DownloaderState,
    pause: Option<PauseBatch>,
}

impl SessionCore {
    /// Create a core in `New` with the given tasks registered as pending.
    pub fn new(
        tasks: Vec<DownloadItemTask>,
        max_active: u32,
        progress_interval: Duration,
    ) -> DownloaderResult<Self> {
        let mut core = Self::empty(max_active, progress_interval);
        core.registry.register(tasks)?;
        Ok(core)
    }

    /// Create a core in `New` from persisted task records.
    ///
    /// Tasks that were active when the record was taken are pending again.
    pub fn restore(
        records: Vec<TaskRecord>,
        max_active: u32,
        progress_interval: Duration,
    ) -> DownloaderResult<Self> {
        let mut core = Self::empty(max_active, progress_interval);
        core.registry.register_records(records)?;
        Ok(core)
    }

    fn empty(max_active: u32, progress_interval: Duration) -> Self {
        Self {
            registry: TaskRegistry::new(),
            limiter: ConcurrencyLimiter::new(max_active),
            progress: ProgressLedger::new(progress_interval),
            started: false,
            cancelled: false,
            published: DownloaderState::New,
            pause: None,
        }
    }

    /// The last published state.
    pub const fn state(&self) -> DownloaderState {
        self.published
    }

    /// Number of active tasks.
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Persistable snapshot of every task.
    pub fn records(&self) -> Vec<TaskRecord> {
        self.registry.records()
    }

    /// Ask every in-flight transfer to abort without changing any state.
    ///
    /// Used when the owner goes away; nobody is left to observe the outcome.
    pub fn abort_in_flight(&self) -> usize {
        let mut count = 0;
        for transfer in self.registry.active_transfers() {
            transfer.control.request_abort();
            count += 1;
        }
        count
    }

    /// Move from `New` to running and admit the first tasks.
    pub fn start(&mut self) -> DownloaderResult<Transition> {
        if self.published != DownloaderState::New {
            return Err(DownloaderError::invalid_state(self.published, "start"));
        }
        self.started = true;

        let mut transition = Transition::default();
        self.settle(&mut transition);
        Ok(transition)
    }

    /// Register more tasks on a running downloader.
    pub fn add_tasks(&mut self, tasks: Vec<DownloadItemTask>) -> DownloaderResult<Transition> {
        if matches!(
            self.published,
            DownloaderState::New | DownloaderState::Cancelled
        ) {
            return Err(DownloaderError::invalid_state(
                self.published,
                "add download item tasks",
            ));
        }
        self.registry.register(tasks)?;

        let mut transition = Transition::default();
        self.settle(&mut transition);
        Ok(transition)
    }

    /// Pause pending tasks and ask every active transfer to suspend.
    ///
    /// When nothing is active the pause resolves in the returned transition.
    /// Otherwise it resolves in the transition of the report that makes the
    /// last active task quiesce. Calling this while a pause is in progress
    /// joins the running batch.
    pub fn pause(&mut self) -> DownloaderResult<Transition> {
        self.ensure_live("pause")?;

        let mut transition = Transition::default();
        if !self.started {
            transition.pause = Some(PauseResolution::Completed(Vec::new()));
            return Ok(transition);
        }

        let paused = self.registry.pause_pending();
        let batch = self.pause.get_or_insert_with(PauseBatch::default);
        batch
            .keys
            .extend(paused.iter().map(|task| task.key().to_string()));

        for transfer in self.registry.active_transfers() {
            transfer.control.request_suspend();
        }

        self.settle(&mut transition);
        Ok(transition)
    }

    /// Re-queue every paused task.
    pub fn resume(&mut self) -> DownloaderResult<Transition> {
        self.ensure_live("resume")?;
        if !self.started || self.pause.is_some() {
            return Err(DownloaderError::invalid_state(self.published, "resume"));
        }
        self.registry.resume_paused();

        let mut transition = Transition::default();
        self.settle(&mut transition);
        Ok(transition)
    }

    /// Abort everything. Terminal.
    pub fn cancel(&mut self) -> DownloaderResult<Transition> {
        self.ensure_live("cancel")?;

        let mut transition = Transition::default();
        self.shut_down(&mut transition);
        transition.events.push(DownloaderEvent::TasksCancelled);
        Ok(transition)
    }

    /// Tear down after an explicit session invalidation. Terminal.
    pub fn invalidate(&mut self) -> DownloaderResult<Transition> {
        self.ensure_live("invalidate session")?;

        let mut transition = Transition::default();
        self.shut_down(&mut transition);
        transition
            .events
            .push(DownloaderEvent::BecameInvalid { error: None });
        Ok(transition)
    }

    /// Check that the session may be refreshed. The core has no state to
    /// change for it.
    pub fn refresh(&self) -> DownloaderResult<()> {
        self.ensure_live("refresh session")
    }

    /// Drop failed tasks. The aggregate state does not depend on them.
    pub fn clear_failed(&mut self) -> DownloaderResult<usize> {
        self.ensure_live("clear failed tasks")?;
        Ok(self.registry.remove_failed())
    }

    /// Byte increment reported by a transfer.
    ///
    /// Returns a progress event when the throttle lets one through.
    pub fn on_progress(
        &mut self,
        content_url: &str,
        lease: LeaseId,
        bytes: u64,
    ) -> Option<DownloaderEvent> {
        if bytes == 0 || self.check_lease(content_url, lease).is_err() {
            return None;
        }
        self.progress
            .record(content_url, bytes)
            .map(|bytes| DownloaderEvent::progress(content_url, bytes))
    }

    /// Terminal report of a transfer.
    pub fn on_transfer_finished(
        &mut self,
        content_url: &str,
        lease: LeaseId,
        result: Result<FetchOutcome, TransportError>,
    ) -> Transition {
        let mut transition = Transition::default();
        if let Err(e) = self.check_lease(content_url, lease) {
            transition.ignored = Some(e);
            return transition;
        }

        if let Some(bytes) = self.progress.finish(content_url) {
            transition
                .events
                .push(DownloaderEvent::progress(content_url, bytes));
        }

        let applied = match result {
            Ok(FetchOutcome::Completed) => self
                .registry
                .complete(content_url, lease)
                .map(|task| Some(DownloaderEvent::TaskFinished { task })),
            Ok(FetchOutcome::Suspended(checkpoint)) => self
                .registry
                .suspend(content_url, lease, checkpoint)
                .map(|task| {
                    self.on_suspended(&task);
                    None
                }),
            Ok(FetchOutcome::Aborted) => {
                let error = TransportError::other("transfer aborted by the transport");
                self.fail_task(content_url, lease, error)
            }
            Err(e) if e.is_fatal() => {
                self.fail_session(&e, &mut transition);
                return transition;
            }
            Err(e) => self.fail_task(content_url, lease, e),
        };

        match applied {
            Ok(event) => transition.events.extend(event),
            Err(e) => transition.ignored = Some(e),
        }
        self.settle(&mut transition);
        transition
    }

    /// A suspension outside a pause keeps its checkpoint and reports nothing;
    /// `TasksPaused` only ever carries a `pause()` batch.
    fn on_suspended(&mut self, task: &DownloadItemTask) {
        if let Some(batch) = self.pause.as_mut() {
            batch.keys.insert(task.key().to_string());
        }
    }

    fn fail_task(
        &mut self,
        content_url: &str,
        lease: LeaseId,
        error: TransportError,
    ) -> Result<Option<DownloaderEvent>, TransitionError> {
        let error = DownloaderError::transport(content_url, error);
        self.registry
            .fail(content_url, lease, error.clone())
            .map(|task| Some(DownloaderEvent::TaskFailed { task, error }))
    }

    fn fail_session(&mut self, cause: &TransportError, transition: &mut Transition) {
        self.shut_down(transition);
        transition.events.push(DownloaderEvent::BecameInvalid {
            error: Some(DownloaderError::fatal_session(cause.to_string())),
        });
    }

    fn shut_down(&mut self, transition: &mut Transition) {
        self.cancelled = true;
        for transfer in self.registry.clear() {
            transfer.control.request_abort();
            transition.aborted += 1;
        }
        self.progress.clear();
        if self.pause.take().is_some() {
            transition.pause = Some(PauseResolution::Interrupted);
        }
        transition.invalidate_session = true;
        self.publish(transition);
    }

    /// Resolve a quiesced pause, refill free slots and publish the state.
    fn settle(&mut self, transition: &mut Transition) {
        if self.pause.is_some() && self.registry.active_count() == 0 {
            self.complete_pause(transition);
        }
        self.admit(transition);
        self.publish(transition);
    }

    fn complete_pause(&mut self, transition: &mut Transition) {
        let Some(batch) = self.pause.take() else {
            return;
        };
        let tasks: Vec<_> = self
            .registry
            .iter()
            .filter(|e| e.status == TaskStatus::Paused && batch.keys.contains(e.task.key()))
            .map(|e| e.task.clone())
            .collect();

        if !tasks.is_empty() {
            transition.events.push(DownloaderEvent::TasksPaused {
                tasks: tasks.clone(),
            });
        }
        transition.pause = Some(PauseResolution::Completed(tasks));
    }

    fn admit(&mut self, transition: &mut Transition) {
        if self.cancelled || !self.started || self.pause.is_some() {
            return;
        }
        let admitted = self.limiter.try_admit(&mut self.registry);
        for admission in &admitted {
            self.progress.track(admission.task.key());
        }
        transition.admissions.extend(admitted);
    }

    fn publish(&mut self, transition: &mut Transition) {
        let state = derive_state(self.registry.statuses(), self.started, self.cancelled);
        if state != self.published {
            self.published = state;
            transition.events.push(DownloaderEvent::state_changed(state));
        }
    }

    fn ensure_live(&self, operation: &str) -> DownloaderResult<()> {
        if self.cancelled {
            return Err(DownloaderError::invalid_state(
                DownloaderState::Cancelled,
                operation,
            ));
        }
        Ok(())
    }

    fn check_lease(&self, content_url: &str, lease: LeaseId) -> Result<(), TransitionError> {
        let entry = self
            .registry
            .get(content_url)
            .ok_or_else(|| TransitionError::UnknownTask {
                content_url: content_url.to_string(),
            })?;
        if entry.lease() == Some(lease) {
            Ok(())
        } else {
            Err(TransitionError::StaleLease {
                content_url: content_url.to_string(),
                lease,
            })
        }
    }
}
