use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::index::IndexedRecord;

/// Terminal status of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Aborted,
    Error,
    ItemError,
    DirDoesNotExist,
    DirReadError,
}

impl SyncStatus {
    /// Numeric code used by external status consumers.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 1,
            Self::Aborted => 2,
            Self::Error => 3,
            Self::ItemError => 4,
            Self::DirDoesNotExist => 5,
            Self::DirReadError => 6,
        }
    }

    fn severity(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ItemError => 1,
            Self::DirDoesNotExist => 2,
            Self::DirReadError => 3,
            Self::Error => 4,
            Self::Aborted => 5,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Aborted => "ABORTED",
            Self::Error => "ERROR",
            Self::ItemError => "ITEM_ERROR",
            Self::DirDoesNotExist => "DIR_DOES_NOT_EXIST",
            Self::DirReadError => "DIR_READ_ERROR",
        };
        f.write_str(name)
    }
}

/// What a pass should cover.
#[derive(Debug, Clone)]
pub enum SyncTarget {
    /// Every registered directory, by priority.
    All,
    /// One registered directory.
    Directory(PathBuf),
    /// Exactly these records, reprocessed from their files.
    Records(Vec<IndexedRecord>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassResult {
    pub status: SyncStatus,
    pub added: usize,
    pub removed: usize,
    pub replaced: usize,
    pub message: String,
}

impl Default for PassResult {
    fn default() -> Self {
        Self {
            status: SyncStatus::Success,
            added: 0,
            removed: 0,
            replaced: 0,
            message: String::new(),
        }
    }
}

impl PassResult {
    pub fn with_status(status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Fold another result in: counters add up, status keeps the worst.
    pub fn absorb(&mut self, other: &PassResult) {
        self.status = self.status.worst(other.status);
        self.added += other.added;
        self.removed += other.removed;
        self.replaced += other.replaced;
    }

    pub fn counts_summary(&self) -> String {
        format!(
            "{} added, {} replaced, {} removed",
            self.added, self.replaced, self.removed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_of_ranking() {
        use SyncStatus::*;
        let ranking = [Success, ItemError, DirDoesNotExist, DirReadError, Error, Aborted];
        for (i, lower) in ranking.iter().enumerate() {
            for higher in &ranking[i..] {
                assert_eq!(lower.worst(*higher), *higher);
                assert_eq!(higher.worst(*lower), *higher);
            }
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(SyncStatus::Success.code(), 1);
        assert_eq!(SyncStatus::DirReadError.code(), 6);
        assert_eq!(SyncStatus::ItemError.to_string(), "ITEM_ERROR");
    }

    #[test]
    fn test_absorb() {
        let mut total = PassResult::default();
        total.absorb(&PassResult {
            added: 2,
            removed: 1,
            ..PassResult::with_status(SyncStatus::ItemError, "")
        });
        total.absorb(&PassResult {
            replaced: 3,
            ..PassResult::default()
        });

        assert_eq!(total.status, SyncStatus::ItemError);
        assert_eq!((total.added, total.replaced, total.removed), (2, 3, 1));
    }
}
