//! Event dispatcher.
//!
//! A single task drains a FIFO of events and delivers them to the bound
//! observer one at a time. Events are enqueued while the session lock is held,
//! so delivery order is exactly mutation order.
//!
//! The observer is held weakly. When it has been dropped, events are
//! discarded; nothing is buffered for a later observer.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use dtg_core::download::DownloaderEvent;
use dtg_core::ports::{BackgroundCompletionHandler, DownloaderObserver, SessionRef, deliver};

type ObserverSlot = Arc<RwLock<Option<Weak<dyn DownloaderObserver>>>>;

/// One unit of work for the dispatch task.
enum Dispatch {
    /// Deliver an event to the observer.
    Event(DownloaderEvent),
    /// Run a callback once everything queued before it was delivered.
    Run(BackgroundCompletionHandler),
}

/// Handle to the dispatch task of one downloader.
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
    observer: ObserverSlot,
}

impl EventDispatcher {
    /// Spawn the dispatch task on `runtime`.
    ///
    /// The task exits once the dispatcher is dropped and the FIFO drained.
    pub fn spawn(runtime: &Handle, session: SessionRef) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer: ObserverSlot = Arc::new(RwLock::new(None));
        runtime.spawn(run_dispatch_loop(rx, Arc::clone(&observer), session));
        Self { tx, observer }
    }

    /// Bind the observer, replacing any previous one.
    pub fn bind(&self, observer: &Arc<dyn DownloaderObserver>) {
        let mut slot = self
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::downgrade(observer));
    }

    /// Enqueue events in order.
    pub fn enqueue(&self, events: impl IntoIterator<Item = DownloaderEvent>) {
        for event in events {
            if self.tx.send(Dispatch::Event(event)).is_err() {
                tracing::warn!(target: "dtg.download", "Dispatch task gone, dropping event");
            }
        }
    }

    /// Run `handler` after every event enqueued so far has been delivered.
    ///
    /// If the dispatch task is gone the handler runs right away.
    pub fn run_after_pending(&self, handler: BackgroundCompletionHandler) {
        if let Err(mpsc::error::SendError(Dispatch::Run(handler))) =
            self.tx.send(Dispatch::Run(handler))
        {
            tracing::debug!(target: "dtg.download", "Dispatch task gone, running handler inline");
            handler();
        }
    }
}

async fn run_dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    observer: ObserverSlot,
    session: SessionRef,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Dispatch::Event(event) => {
                let target = observer
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                    .and_then(Weak::upgrade);
                let Some(target) = target else {
                    tracing::trace!(
                        target: "dtg.download",
                        item = %session.dtg_item_id,
                        kind = event.kind(),
                        "No observer bound, dropping event"
                    );
                    continue;
                };
                let delivered = catch_unwind(AssertUnwindSafe(|| {
                    deliver(target.as_ref(), &session, &event);
                }));
                if delivered.is_err() {
                    tracing::error!(
                        target: "dtg.download",
                        item = %session.dtg_item_id,
                        kind = event.kind(),
                        "Observer panicked while handling event"
                    );
                }
            }
            Dispatch::Run(handler) => {
                if catch_unwind(AssertUnwindSafe(handler)).is_err() {
                    tracing::error!(
                        target: "dtg.download",
                        item = %session.dtg_item_id,
                        "Background completion handler panicked"
                    );
                }
            }
        }
    }
}
