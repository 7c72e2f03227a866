//! Shared fixtures for downloader integration tests.
//!
//! - `ScriptedTransport` hands out sessions whose transfers block until the
//!   test feeds them steps, and honour suspend/abort like a real adapter.
//!   In manual-suspend mode a suspend request is only acknowledged when the
//!   test sends `Step::Suspend`, which keeps a pause in flight on demand.
//! - `RecordingObserver` stores every callback as a `DownloaderEvent`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dtg_core::ports::{Interruption, TransferControl};
use dtg_download::{
    DownloadItemTask, Downloader, DownloaderConfig, DownloaderError, DownloaderEvent,
    DownloaderImpl, DownloaderObserver, DownloaderState, FetchOutcome, FetchRequest,
    ResumeCheckpoint, SessionRef, TrackType, TransportError, TransportPort, TransportSession,
};
use tokio::sync::{Notify, mpsc};
use url::Url;

/// How long any wait in a test may take before it is considered hung.
pub const WAIT: Duration = Duration::from_secs(5);

// ── Tasks ──────────────────────────────────────────────────────────

pub fn url(name: &str) -> String {
    format!("https://cdn.example.com/item/{name}")
}

pub fn task(name: &str) -> DownloadItemTask {
    let track = if name.ends_with(".vtt") {
        TrackType::Text
    } else if name.ends_with(".aac") {
        TrackType::Audio
    } else {
        TrackType::Video
    };
    DownloadItemTask::new(
        Url::parse(&url(name)).unwrap(),
        track,
        format!("/tmp/dtg/{name}"),
    )
}

pub fn tasks(names: &[&str]) -> Vec<DownloadItemTask> {
    names.iter().map(|n| task(n)).collect()
}

pub fn config(cap: u32) -> DownloaderConfig {
    DownloaderConfig::new("item-1")
        .with_max_concurrent(cap)
        .with_progress_interval(Duration::ZERO)
}

// ── Scripted transport ─────────────────────────────────────────────

/// What a running transfer does next.
#[derive(Debug)]
pub enum Step {
    Progress(u64),
    Complete,
    Suspend,
    Fail(TransportError),
}

/// A transfer the session has started.
#[derive(Clone)]
pub struct StartedTransfer {
    pub content_url: String,
    pub session_id: String,
    pub resume_checkpoint: Option<ResumeCheckpoint>,
    pub control: TransferControl,
    steps: mpsc::UnboundedSender<Step>,
}

impl StartedTransfer {
    pub fn send(&self, step: Step) {
        self.steps.send(step).expect("transfer already finished");
    }

    /// Send a step unless the transfer already returned.
    pub fn try_send(&self, step: Step) -> bool {
        self.steps.send(step).is_ok()
    }

    pub fn suspend(&self) {
        self.send(Step::Suspend);
    }

    /// Wait until the downloader asked this transfer to suspend.
    pub async fn wait_suspend_requested(&self) {
        eventually(|| self.control.is_suspend_requested()).await;
    }

    pub fn progress(&self, bytes: u64) {
        self.send(Step::Progress(bytes));
    }

    pub fn complete(&self) {
        self.send(Step::Complete);
    }

    pub fn fail(&self, error: TransportError) {
        self.send(Step::Fail(error));
    }
}

#[derive(Default)]
struct Ledger {
    started: Mutex<Vec<StartedTransfer>>,
    finished: Mutex<Vec<(String, String)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    manual_suspend: AtomicBool,
    changed: Notify,
}

impl Ledger {
    fn record_start(&self, transfer: StartedTransfer) {
        self.started.lock().unwrap().push(transfer);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    fn record_finish(&self, content_url: &str, outcome: &str) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished
            .lock()
            .unwrap()
            .push((content_url.to_string(), outcome.to_string()));
        self.changed.notify_waiters();
    }
}

/// Transport whose transfers are driven step by step from the test.
#[derive(Default)]
pub struct ScriptedTransport {
    ledger: Arc<Ledger>,
    sessions: Mutex<Vec<Arc<ScriptedSession>>>,
    fail_open: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport whose transfers only suspend on `Step::Suspend`.
    pub fn manual_suspend() -> Arc<Self> {
        let transport = Self::default();
        transport.ledger.manual_suspend.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// Make every later `open_session` fail.
    pub fn fail_next_opens(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<ScriptedSession> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    pub fn started(&self) -> Vec<StartedTransfer> {
        self.ledger.started.lock().unwrap().clone()
    }

    pub fn started_urls(&self) -> Vec<String> {
        self.started().into_iter().map(|t| t.content_url).collect()
    }

    /// Transfers that returned, with their outcome name.
    pub fn finished(&self) -> Vec<(String, String)> {
        self.ledger.finished.lock().unwrap().clone()
    }

    pub fn running(&self) -> usize {
        self.ledger.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.ledger.max_running.load(Ordering::SeqCst)
    }

    /// Wait until `count` transfers have been started in total.
    pub async fn wait_started(&self, count: usize) -> Vec<StartedTransfer> {
        self.wait_until(|| self.started().len() >= count).await;
        self.started()
    }

    /// Wait until `count` transfers have returned in total.
    pub async fn wait_finished(&self, count: usize) {
        self.wait_until(|| self.finished().len() >= count).await;
    }

    /// Latest transfer of a task.
    pub async fn transfer(&self, name: &str) -> StartedTransfer {
        let key = url(name);
        self.wait_until(|| self.started().iter().any(|t| t.content_url == key))
            .await;
        self.started()
            .into_iter()
            .rev()
            .find(|t| t.content_url == key)
            .unwrap()
    }

    async fn wait_until(&self, mut done: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.ledger.changed.notified();
                if done() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for transport");
    }
}

impl TransportPort for ScriptedTransport {
    fn open_session(
        &self,
        session_identifier: &str,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::network("cannot open session"));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let session = Arc::new(ScriptedSession {
            id: format!("{session_identifier}#{}", sessions.len()),
            valid: AtomicBool::new(true),
            ledger: Arc::clone(&self.ledger),
        });
        sessions.push(Arc::clone(&session));
        Ok(session)
    }
}

pub struct ScriptedSession {
    id: String,
    valid: AtomicBool,
    ledger: Arc<Ledger>,
}

#[async_trait]
impl TransportSession for ScriptedSession {
    fn identifier(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, TransportError> {
        let content_url = request.task.key().to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut written = request.resume_checkpoint.as_ref().map_or(0, |c| c.offset);
        self.ledger.record_start(StartedTransfer {
            content_url: content_url.clone(),
            session_id: self.id.clone(),
            resume_checkpoint: request.resume_checkpoint.clone(),
            control: request.control.clone(),
            steps: tx,
        });
        let manual_suspend = self.ledger.manual_suspend.load(Ordering::SeqCst);
        let suspended = |written: u64| {
            FetchOutcome::Suspended(Some(ResumeCheckpoint::at(written).with_validator("etag-1")))
        };

        let result = loop {
            tokio::select! {
                // Queued steps win over interruptions so tests can script races.
                biased;
                step = rx.recv() => match step {
                    Some(Step::Progress(bytes)) => {
                        written += bytes;
                        request.progress.report(bytes);
                    }
                    Some(Step::Complete) => break Ok(FetchOutcome::Completed),
                    Some(Step::Suspend) => break Ok(suspended(written)),
                    Some(Step::Fail(e)) => break Err(e),
                    None => std::future::pending::<()>().await,
                },
                interruption = wait_interrupted(&request.control, manual_suspend) => {
                    break Ok(match interruption {
                        Interruption::Suspend => suspended(written),
                        Interruption::Abort => FetchOutcome::Aborted,
                    });
                }
            }
        };

        let outcome = match &result {
            Ok(FetchOutcome::Completed) => "completed",
            Ok(FetchOutcome::Suspended(_)) => "suspended",
            Ok(FetchOutcome::Aborted) => "aborted",
            Err(_) => "failed",
        };
        self.ledger.record_finish(&content_url, outcome);
        result
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

async fn wait_interrupted(control: &TransferControl, manual_suspend: bool) -> Interruption {
    if !manual_suspend {
        return control.interrupted().await;
    }
    while !control.is_abort_requested() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Interruption::Abort
}

// ── Recording observer ─────────────────────────────────────────────

/// Observer that records every callback, in delivery order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<DownloaderEvent>>,
    sessions: Mutex<Vec<SessionRef>>,
    changed: Notify,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind this observer to a downloader.
    pub fn attach(self: &Arc<Self>, downloader: &DownloaderImpl) {
        let observer: Arc<dyn DownloaderObserver> = self.clone();
        downloader.set_observer(&observer);
    }

    pub fn events(&self) -> Vec<DownloaderEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events other than progress.
    pub fn lifecycle(&self) -> Vec<DownloaderEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, DownloaderEvent::Progress { .. }))
            .collect()
    }

    pub fn states(&self) -> Vec<DownloaderState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DownloaderEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn progress_of(&self, name: &str) -> u64 {
        let key = url(name);
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DownloaderEvent::Progress {
                    content_url,
                    bytes_written,
                } if content_url == key => Some(bytes_written),
                _ => None,
            })
            .sum()
    }

    pub fn sessions(&self) -> Vec<SessionRef> {
        self.sessions.lock().unwrap().clone()
    }

    /// Wait until an event matching `pred` was delivered.
    pub async fn wait_for(&self, pred: impl Fn(&DownloaderEvent) -> bool) {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.changed.notified();
                if self.events().iter().any(&pred) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for event");
    }

    pub async fn wait_for_state(&self, state: DownloaderState) {
        self.wait_for(|e| matches!(e, DownloaderEvent::StateChanged { state: s } if *s == state))
            .await;
    }

    fn push(&self, downloader: &SessionRef, event: DownloaderEvent) {
        self.sessions.lock().unwrap().push(downloader.clone());
        self.events.lock().unwrap().push(event);
        self.changed.notify_waiters();
    }
}

impl DownloaderObserver for RecordingObserver {
    fn did_progress(&self, downloader: &SessionRef, content_url: &str, bytes_written: u64) {
        self.push(downloader, DownloaderEvent::progress(content_url, bytes_written));
    }

    fn did_pause_download_tasks(&self, downloader: &SessionRef, tasks: &[DownloadItemTask]) {
        self.push(
            downloader,
            DownloaderEvent::TasksPaused {
                tasks: tasks.to_vec(),
            },
        );
    }

    fn did_cancel_download_tasks(&self, downloader: &SessionRef) {
        self.push(downloader, DownloaderEvent::TasksCancelled);
    }

    fn did_finish_downloading(&self, downloader: &SessionRef, task: &DownloadItemTask) {
        self.push(downloader, DownloaderEvent::TaskFinished { task: task.clone() });
    }

    fn did_change_to_state(&self, downloader: &SessionRef, new_state: DownloaderState) {
        self.push(downloader, DownloaderEvent::state_changed(new_state));
    }

    fn did_become_invalid(&self, downloader: &SessionRef, error: Option<&DownloaderError>) {
        self.push(
            downloader,
            DownloaderEvent::BecameInvalid {
                error: error.cloned(),
            },
        );
    }

    fn did_fail_with_error(
        &self,
        downloader: &SessionRef,
        task: &DownloadItemTask,
        error: &DownloaderError,
    ) {
        self.push(
            downloader,
            DownloaderEvent::TaskFailed {
                task: task.clone(),
                error: error.clone(),
            },
        );
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Poll `done` until it holds.
pub async fn eventually(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Wait until every event enqueued so far has been delivered.
pub async fn drain_events(downloader: &DownloaderImpl) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    downloader.set_background_completion_handler(Box::new(move || {
        let _ = tx.send(());
    }));
    downloader.background_events_flushed();
    tokio::time::timeout(WAIT, rx)
        .await
        .expect("timed out draining events")
        .expect("handler dropped");
}

pub fn finished(name: &str) -> impl Fn(&DownloaderEvent) -> bool {
    let key = url(name);
    move |e| matches!(e, DownloaderEvent::TaskFinished { task } if task.key() == key)
}

pub fn failed(name: &str) -> impl Fn(&DownloaderEvent) -> bool {
    let key = url(name);
    move |e| matches!(e, DownloaderEvent::TaskFailed { task, .. } if task.key() == key)
}

/// Build a started downloader with an attached recorder.
pub fn started(
    names: &[&str],
    cap: u32,
) -> (DownloaderImpl, Arc<ScriptedTransport>, Arc<RecordingObserver>) {
    started_on(ScriptedTransport::new(), names, cap)
}

/// Like `started`, on a given transport.
pub fn started_on(
    transport: Arc<ScriptedTransport>,
    names: &[&str],
    cap: u32,
) -> (DownloaderImpl, Arc<ScriptedTransport>, Arc<RecordingObserver>) {
    let downloader = DownloaderImpl::new(config(cap), tasks(names), transport.clone()).unwrap();
    let observer = RecordingObserver::new();
    observer.attach(&downloader);
    downloader.start().unwrap();
    (downloader, transport, observer)
}
