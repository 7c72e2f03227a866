//! Progress tracking and throttling.
//!
//! Transports report raw byte increments; the ledger turns them into
//! per-task progress events no more frequent than the configured interval.

mod ledger;
mod throttle;

pub use ledger::ProgressLedger;
use throttle::ProgressThrottle;
