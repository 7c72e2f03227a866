//! Per-task progress coalescing.

use std::collections::HashMap;
use std::time::Duration;

use super::ProgressThrottle;

#[derive(Debug)]
struct TaskProgress {
    throttle: ProgressThrottle,
    unreported: u64,
}

/// Coalesces byte increments of active tasks into throttled progress events.
///
/// Increments that are held back by the throttle are carried over, so the sum
/// of emitted increments always equals the bytes reported by the transport.
#[derive(Debug)]
pub struct ProgressLedger {
    interval: Duration,
    tasks: HashMap<String, TaskProgress>,
}

impl ProgressLedger {
    /// Create a ledger emitting at most one event per task per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tasks: HashMap::new(),
        }
    }

    /// Begin tracking a task that was just admitted.
    pub fn track(&mut self, content_url: &str) {
        self.tasks.insert(
            content_url.to_string(),
            TaskProgress {
                throttle: ProgressThrottle::new(self.interval),
                unreported: 0,
            },
        );
    }

    /// Record an increment. Returns the bytes to emit now, if any.
    pub fn record(&mut self, content_url: &str, bytes: u64) -> Option<u64> {
        let progress = self.tasks.get_mut(content_url)?;
        progress.unreported += bytes;
        if progress.unreported > 0 && progress.throttle.should_emit() {
            Some(std::mem::take(&mut progress.unreported))
        } else {
            None
        }
    }

    /// Stop tracking a task. Returns the bytes still held back, if any.
    pub fn finish(&mut self, content_url: &str) -> Option<u64> {
        self.tasks
            .remove(content_url)
            .map(|p| p.unreported)
            .filter(|&bytes| bytes > 0)
    }

    /// Forget every task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
