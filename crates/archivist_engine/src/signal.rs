use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::Value;

#[derive(Default)]
struct Slot {
    cancelled: bool,
    input: Option<Value>,
}

/// Cancellation flag plus a single-slot mailbox for client input, shared
/// between a job thread and the registry.
#[derive(Default)]
pub struct JobSignal {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl JobSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn cancel(&self) {
        self.lock().cancelled = true;
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Stores client input, replacing anything not yet consumed.
    pub fn deliver(&self, value: Value) {
        self.lock().input = Some(value);
        self.changed.notify_all();
    }

    pub fn clear_input(&self) {
        self.lock().input = None;
    }

    /// Blocks until input arrives (returned) or the job is cancelled (`None`).
    /// Each wait lasts at most `slice` before the flags are checked again.
    pub fn wait_for_input(&self, slice: Duration) -> Option<Value> {
        let mut slot = self.lock();
        loop {
            if slot.cancelled {
                return None;
            }
            if let Some(value) = slot.input.take() {
                return Some(value);
            }
            slot = match self.changed.wait_timeout(slot, slice) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` when cancelled.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut slot = self.lock();
        loop {
            if slot.cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            slot = match self.changed.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
