//! Shared engine state: in-flight tracking, the stop flag and the outcome of
//! the last pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::status::PassResult;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCounts {
    pub added: usize,
    pub removed: usize,
    pub replaced: usize,
}

#[derive(Debug, Default)]
pub struct EngineState {
    in_flight: Mutex<usize>,
    idle: Condvar,
    stop: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_counts: Mutex<PassCounts>,
}

/// Counts one operation as in flight until dropped.
#[must_use = "the operation is only tracked while the guard is alive"]
pub struct InFlightGuard<'a> {
    state: &'a EngineState,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.state.in_flight.lock();
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.state.idle.notify_all();
        }
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> InFlightGuard<'_> {
        *self.in_flight.lock() += 1;
        InFlightGuard { state: self }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Block until nothing is in flight.
    pub fn wait_idle(&self) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.idle.wait(&mut in_flight);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) with an upper bound. Returns
    /// whether the state went idle.
    pub fn wait_idle_for(&self, timeout: Duration) -> bool {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            if self.idle.wait_for(&mut in_flight, timeout).timed_out() {
                return *in_flight == 0;
            }
        }
        true
    }

    /// Remember the outcome of a finished pass.
    pub fn record_pass(&self, result: &PassResult) {
        *self.last_counts.lock() = PassCounts {
            added: result.added,
            removed: result.removed,
            replaced: result.replaced,
        };
        if matches!(
            result.status,
            super::SyncStatus::Success | super::SyncStatus::ItemError
        ) {
            *self.last_sync.lock() = Some(Utc::now());
        }
    }

    /// Time of the last pass that completed without a pass-level failure.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }

    pub fn last_counts(&self) -> PassCounts {
        *self.last_counts.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncStatus;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_tracks_in_flight() {
        let state = EngineState::new();
        assert!(!state.is_busy());
        {
            let _a = state.enter();
            let _b = state.enter();
            assert_eq!(state.in_flight(), 2);
        }
        assert!(!state.is_busy());
    }

    #[test]
    fn test_wait_idle_blocks_until_guards_drop() {
        let state = Arc::new(EngineState::new());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let worker = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let _guard = state.enter();
                entered_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(100));
            })
        };

        entered_rx.recv().unwrap();
        assert!(!state.wait_idle_for(Duration::from_millis(10)));
        state.wait_idle();
        assert!(!state.is_busy());
        worker.join().unwrap();
    }

    #[test]
    fn test_record_pass_only_stamps_completed_passes() {
        let state = EngineState::new();
        state.record_pass(&PassResult::with_status(SyncStatus::Error, "boom"));
        assert!(state.last_sync().is_none());

        let result = PassResult {
            added: 3,
            ..PassResult::with_status(SyncStatus::ItemError, "")
        };
        state.record_pass(&result);
        assert!(state.last_sync().is_some());
        assert_eq!(state.last_counts().added, 3);
    }
}
