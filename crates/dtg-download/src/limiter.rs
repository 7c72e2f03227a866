//! Concurrency limiter.
//!
//! Admits pending tasks in registration order while fewer than the cap are
//! active. Admission is a registry transition plus a fresh lease and
//! transfer control; starting the transfer is left to the caller.

use dtg_core::download::DownloadItemTask;
use dtg_core::ports::TransferControl;

use crate::registry::{ActiveTransfer, LeaseId, TaskRegistry};

/// A task that was just moved to active and must be handed to the transport.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Snapshot of the task at admission, including its checkpoint.
    pub task: DownloadItemTask,
    /// Lease of this admission.
    pub lease: LeaseId,
    /// Control shared with the transfer.
    pub control: TransferControl,
}

/// Bounds the number of active tasks.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_active: usize,
    next_lease: u64,
}

impl ConcurrencyLimiter {
    /// Create a limiter. A cap of zero is raised to one.
    pub fn new(max_active: u32) -> Self {
        Self {
            max_active: usize::try_from(max_active.max(1)).unwrap_or(usize::MAX),
            next_lease: 1,
        }
    }

    /// Number of admissions that would fit right now.
    pub fn free_slots(&self, registry: &TaskRegistry) -> usize {
        self.max_active.saturating_sub(registry.active_count())
    }

    /// Admit pending tasks until the cap is reached or nothing is pending.
    pub fn try_admit(&mut self, registry: &mut TaskRegistry) -> Vec<Admission> {
        let mut admitted = Vec::new();
        while self.free_slots(registry) > 0 {
            let Some(key) = registry.next_pending().map(|t| t.key().to_string()) else {
                break;
            };

            let lease = self.mint_lease();
            let control = TransferControl::new();
            let transfer = ActiveTransfer {
                lease,
                control: control.clone(),
            };
            // next_pending just returned this key as pending
            let Ok(task) = registry.activate(&key, transfer) else {
                break;
            };
            admitted.push(Admission {
                task: task.clone(),
                lease,
                control,
            });
        }
        admitted
    }

    fn mint_lease(&mut self) -> LeaseId {
        let lease = LeaseId::new(self.next_lease);
        self.next_lease += 1;
        lease
    }
}
