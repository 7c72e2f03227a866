//! Progress throttling.
//!
//! One gate per active task: it opens at most once per interval so a fast
//! transfer does not flood the observer.

use std::time::{Duration, Instant};

/// Interval gate for the progress events of one task.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    opened_at: Option<Instant>,
}

impl ProgressThrottle {
    /// Create a gate that opens at most once per `min_interval`.
    ///
    /// The first check always opens.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            opened_at: None,
        }
    }

    /// Whether an event may be emitted now.
    pub fn should_emit(&mut self) -> bool {
        self.should_emit_at(Instant::now())
    }

    /// Whether an event may be emitted at `now`. Opening the gate restarts
    /// the interval.
    pub fn should_emit_at(&mut self, now: Instant) -> bool {
        let open = self
            .opened_at
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval);
        if open {
            self.opened_at = Some(now);
        }
        open
    }
}
