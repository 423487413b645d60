//! Error documents stand in for files a writer could not handle.
//!
//! They keep the path, directory and modification time of the file so the
//! next pass reprocesses it unconditionally, and so cleanup still finds it.

use std::path::Path;

use chrono::Utc;

use super::WriterError;
use crate::index::record::{ERROR_DOC_TYPE, ErrorDetails, IndexedRecord};

pub fn error_record(file: &Path, dir: &Path, mtime_ms: i64, error: &WriterError) -> IndexedRecord {
    let mut record = IndexedRecord::new(file, dir, mtime_ms);
    record.doc_type = ERROR_DOC_TYPE.to_string();
    record.indexed_at = Utc::now();
    record.error = Some(ErrorDetails {
        kind: error.kind_name().to_string(),
        message: error.to_string(),
        detail: error.detail(),
    });
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_record_is_live_and_flagged() {
        let err = WriterError::Parse {
            path: PathBuf::from("/d/bad.xml"),
            reason: "unexpected end of input".to_string(),
        };
        let record = error_record(Path::new("/d/bad.xml"), Path::new("/d"), 77, &err);

        assert!(record.is_error());
        assert!(!record.deleted);
        assert_eq!(record.doc_type, ERROR_DOC_TYPE);
        assert_eq!(record.purge_dir.as_deref(), Some(Path::new("/d")));
        assert_eq!(record.mtime_ms, 77);
        let details = record.error.unwrap();
        assert_eq!(details.kind, "parse");
        assert!(details.message.contains("unexpected end of input"));
    }
}
