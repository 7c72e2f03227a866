//! Transfer worker.
//!
//! Runs one admitted task on a transport session. The worker operates on
//! value types and a cloned session handle, with no access to the manager's
//! lock; its only output is the terminal result it returns.

use std::sync::Arc;

use dtg_core::download::TransportError;
use dtg_core::ports::{FetchOutcome, FetchRequest, Interruption, ProgressSink, TransportSession};

use crate::limiter::Admission;

/// Run one transfer to a terminal outcome.
///
/// If the transfer was interrupted between admission and start, the
/// transport is never called.
pub async fn run_transfer(
    session: Arc<dyn TransportSession>,
    admission: Admission,
    progress: ProgressSink,
) -> Result<FetchOutcome, TransportError> {
    let Admission { task, control, .. } = admission;

    match control.interruption() {
        Some(Interruption::Abort) => return Ok(FetchOutcome::Aborted),
        Some(Interruption::Suspend) => {
            return Ok(FetchOutcome::Suspended(task.resume_checkpoint));
        }
        None => {}
    }

    let request = FetchRequest {
        resume_checkpoint: task.resume_checkpoint.clone(),
        task,
        control,
        progress,
    };
    session.fetch(request).await
}
