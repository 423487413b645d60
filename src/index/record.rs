//! The indexed record: one entry per source file, keyed by absolute path.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keyword field names usable for removal, streaming and term listing.
pub mod fields {
    pub const PATH: &str = "path";
    pub const FILE_NAME: &str = "file_name";
    pub const DIR: &str = "dir";
    /// Present only on live records; used to find a directory's records for cleanup.
    pub const PURGE_DIR: &str = "purge_dir";
    pub const DELETED: &str = "deleted";
    pub const ERROR: &str = "error";
    pub const DOC_TYPE: &str = "doc_type";
    pub const ID: &str = "id";
    pub const VALID: &str = "valid";
    pub const ERROR_KIND: &str = "error_kind";

    pub const KEYWORDS: &[&str] = &[
        PATH, FILE_NAME, DIR, PURGE_DIR, DELETED, ERROR, DOC_TYPE, ID, VALID, ERROR_KIND,
    ];

    pub fn is_keyword(name: &str) -> bool {
        KEYWORDS.contains(&name)
    }
}

/// Document type stored on error documents.
pub const ERROR_DOC_TYPE: &str = "errordoc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    pub report: Option<String>,
}

/// Why a writer could not build a document for this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub kind: String,
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub dir: PathBuf,
    pub purge_dir: Option<PathBuf>,
    /// File modification time, milliseconds since the epoch.
    pub mtime_ms: i64,
    pub deleted: bool,
    pub doc_type: String,
    pub id: Option<String>,
    pub content: String,
    pub fields: BTreeMap<String, String>,
    pub indexed_at: DateTime<Utc>,
    pub validation: Option<Validation>,
    pub error: Option<ErrorDetails>,
}

impl IndexedRecord {
    /// A bare live record for `path` inside `dir`.
    pub fn new(path: impl Into<PathBuf>, dir: impl Into<PathBuf>, mtime_ms: i64) -> Self {
        let path = path.into();
        let dir = dir.into();
        Self {
            file_name: file_name_of(&path),
            path,
            purge_dir: Some(dir.clone()),
            dir,
            mtime_ms,
            deleted: false,
            doc_type: String::new(),
            id: None,
            content: String::new(),
            fields: BTreeMap::new(),
            indexed_at: Utc::now(),
            validation: None,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn path_key(&self) -> String {
        path_key(&self.path)
    }

    /// The tombstone form used by the deletion-preserving policy.
    pub fn as_deleted(&self) -> Self {
        Self {
            deleted: true,
            purge_dir: None,
            indexed_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Value of a keyword field, as the index stores it.
    pub fn keyword(&self, field: &str) -> Option<String> {
        match field {
            fields::PATH => Some(self.path_key()),
            fields::FILE_NAME => Some(self.file_name.clone()),
            fields::DIR => Some(path_key(&self.dir)),
            fields::PURGE_DIR => self.purge_dir.as_deref().map(path_key),
            fields::DELETED => Some(flag(self.deleted)),
            fields::ERROR => Some(flag(self.is_error())),
            fields::DOC_TYPE => Some(self.doc_type.clone()),
            fields::ID => self.id.clone(),
            fields::VALID => self.validation.as_ref().map(|v| flag(v.valid)),
            fields::ERROR_KIND => self.error.as_ref().map(|e| e.kind.clone()),
            _ => None,
        }
    }
}

/// Canonical string form of a path used as an index term.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Modification time at millisecond granularity.
pub fn mtime_millis(metadata: &Metadata) -> std::io::Result<i64> {
    let modified = metadata.modified()?;
    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    };
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_values() {
        let mut record = IndexedRecord::new("/data/a/one.xml", "/data/a", 1_000);
        record.id = Some("rec-1".to_string());

        assert_eq!(record.file_name, "one.xml");
        assert_eq!(record.keyword(fields::PATH).as_deref(), Some("/data/a/one.xml"));
        assert_eq!(record.keyword(fields::PURGE_DIR).as_deref(), Some("/data/a"));
        assert_eq!(record.keyword(fields::DELETED).as_deref(), Some("false"));
        assert_eq!(record.keyword(fields::ID).as_deref(), Some("rec-1"));
        assert_eq!(record.keyword(fields::VALID), None);
        assert_eq!(record.keyword("title"), None);
    }

    #[test]
    fn test_as_deleted_drops_purge_dir() {
        let record = IndexedRecord::new("/data/a/one.xml", "/data/a", 1_000);
        let tombstone = record.as_deleted();

        assert!(tombstone.deleted);
        assert_eq!(tombstone.purge_dir, None);
        assert_eq!(tombstone.dir, record.dir);
        assert_eq!(tombstone.mtime_ms, record.mtime_ms);
    }
}
