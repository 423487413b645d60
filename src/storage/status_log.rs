//! Rolling log of human-readable indexing status messages.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::error::StoreResult;
use super::kv::KeyValueStore;

/// Key the log is persisted under.
pub const STATUS_LOG_KEY: &str = "indexing_status_messages";

pub const DEFAULT_CAPACITY: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl StatusEntry {
    /// e.g. `Tue, Mar 4 2:07:31 PM Indexing completed`
    pub fn render(&self) -> String {
        format!("{} {}", self.at.format("%a, %b %-d %-I:%M:%S %p"), self.message)
    }
}

/// Newest entries last; the oldest entry is dropped once `capacity` is reached.
#[derive(Debug)]
pub struct StatusLog {
    store: Arc<KeyValueStore>,
    capacity: usize,
    entries: VecDeque<StatusEntry>,
}

impl StatusLog {
    /// Load the persisted log, trimming it to `capacity`.
    pub fn load(store: Arc<KeyValueStore>, capacity: usize) -> StoreResult<Self> {
        let capacity = capacity.max(1);
        let mut entries: VecDeque<StatusEntry> =
            store.get(STATUS_LOG_KEY)?.unwrap_or_default();
        while entries.len() > capacity {
            entries.pop_front();
        }
        Ok(Self {
            store,
            capacity,
            entries,
        })
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self {
            store: Arc::new(KeyValueStore::in_memory()),
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Append a message and persist the log.
    pub fn push(&mut self, message: impl Into<String>) -> StoreResult<()> {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(StatusEntry {
            at: Local::now(),
            message: message.into(),
        });
        self.store.put(STATUS_LOG_KEY, &self.entries)
    }

    pub fn entries(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter()
    }

    /// Rendered messages, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(StatusEntry::render).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_rolls_over() {
        let mut log = StatusLog::in_memory(3);
        for i in 0..5 {
            log.push(format!("pass {i}")).unwrap();
        }

        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["pass 2", "pass 3", "pass 4"]);
    }

    #[test]
    fn test_log_is_persisted_under_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let store = Arc::new(KeyValueStore::open(&path).unwrap());

        let mut log = StatusLog::load(Arc::clone(&store), 25).unwrap();
        log.push("Indexing completed").unwrap();
        drop(log);

        let reopened = Arc::new(KeyValueStore::open(&path).unwrap());
        let log = StatusLog::load(reopened, 25).unwrap();
        assert_eq!(log.len(), 1);
        assert!(log.messages()[0].ends_with(" Indexing completed"));
    }

    #[test]
    fn test_load_trims_to_smaller_capacity() {
        let store = Arc::new(KeyValueStore::in_memory());
        let mut log = StatusLog::load(Arc::clone(&store), 10).unwrap();
        for i in 0..10 {
            log.push(format!("pass {i}")).unwrap();
        }

        let smaller = StatusLog::load(store, 4).unwrap();
        assert_eq!(smaller.len(), 4);
        assert_eq!(smaller.entries().next().unwrap().message, "pass 6");
    }
}
