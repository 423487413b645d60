//! Coalescing of change events per monitored directory.
//!
//! Copying a batch of files into a directory produces a burst of events; the
//! directory is only handed on once it has been quiet for the debounce window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    /// directory -> time of its latest event
    pending: HashMap<PathBuf, Instant>,
    quiet_for: Duration,
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            quiet_for: Duration::from_millis(debounce_ms),
        }
    }

    /// Note activity in `dir`, restarting its window.
    pub fn record(&mut self, dir: PathBuf) {
        self.pending.insert(dir, Instant::now());
    }

    /// Forget `dir`, e.g. after it was deregistered.
    pub fn forget(&mut self, dir: &Path) {
        self.pending.remove(dir);
    }

    /// Directories quiet for the whole window, in path order.
    pub fn take_ready(&mut self) -> Vec<PathBuf> {
        self.take_ready_at(Instant::now())
    }

    fn take_ready_at(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready = Vec::new();
        self.pending.retain(|dir, last| {
            let quiet = now.saturating_duration_since(*last) >= self.quiet_for;
            if quiet {
                ready.push(dir.clone());
            }
            !quiet
        });
        ready.sort();
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_one_directory() {
        let mut debouncer = Debouncer::new(50);
        let dir = PathBuf::from("/data/incoming");
        for _ in 0..10 {
            debouncer.record(dir.clone());
        }
        assert_eq!(debouncer.pending_count(), 1);
        assert!(debouncer.take_ready().is_empty());

        let later = Instant::now() + Duration::from_millis(60);
        assert_eq!(debouncer.take_ready_at(later), vec![dir]);
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_new_event_restarts_window() {
        let mut debouncer = Debouncer::new(50);
        let dir = PathBuf::from("/data/a");
        debouncer.record(dir.clone());
        std::thread::sleep(Duration::from_millis(30));
        debouncer.record(dir.clone());

        let checked = Instant::now() + Duration::from_millis(25);
        assert!(debouncer.take_ready_at(checked).is_empty());
        let checked = Instant::now() + Duration::from_millis(60);
        assert_eq!(debouncer.take_ready_at(checked), vec![dir]);
    }

    #[test]
    fn test_ready_directories_are_sorted() {
        let mut debouncer = Debouncer::new(0);
        debouncer.record(PathBuf::from("/data/b"));
        debouncer.record(PathBuf::from("/data/a"));
        debouncer.record(PathBuf::from("/data/c"));
        debouncer.forget(Path::new("/data/c"));

        assert_eq!(
            debouncer.take_ready(),
            vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")]
        );
    }
}
