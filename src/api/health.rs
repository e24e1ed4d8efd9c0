//! Shared health state for the /health endpoint. Updated by the scheduler,
//! read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// True while the scheduler loop is alive.
    pub scheduler_running: AtomicBool,
    /// Epoch seconds of the last completed scheduler tick (0 = none).
    pub last_tick_at: AtomicI64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scheduler_running(&self, v: bool) {
        self.scheduler_running.store(v, Ordering::Relaxed);
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler_running.load(Ordering::Relaxed)
    }

    pub fn set_last_tick_at(&self, secs: i64) {
        self.last_tick_at.store(secs, Ordering::Relaxed);
    }

    pub fn last_tick_at(&self) -> i64 {
        self.last_tick_at.load(Ordering::Relaxed)
    }
}
