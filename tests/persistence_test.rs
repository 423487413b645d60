//! An engine built from settings keeps its index and status log across restarts.

use std::fs;

use metasync::config::{DirectoryConfig, Settings};
use metasync::storage::{KeyValueStore, STATUS_LOG_KEY, StatusEntry};
use metasync::sync::{SyncStatus, SyncTarget};
use metasync::writer::WriterRegistry;
use metasync::{SyncEngine, SyncError};
use tempfile::TempDir;

fn settings_in(temp: &TempDir) -> Settings {
    let data = temp.path().join("data");
    fs::create_dir_all(&data).unwrap();

    let mut settings = Settings::default();
    settings.index_path = temp.path().join("index");
    settings.state_path = temp.path().join("state.json");
    settings.sync.status_history = 3;
    settings.directories.push(DirectoryConfig {
        path: data,
        writer: "text".to_string(),
        priority: 5,
        config: [("id_pattern".to_string(), "<id>(.*?)</id>".to_string())]
            .into_iter()
            .collect(),
    });
    settings
}

#[test]
fn test_index_and_status_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let settings = settings_in(&temp);
    fs::write(settings.directories[0].path.join("a.xml"), "<id>a</id>").unwrap();
    let writers = WriterRegistry::with_defaults();

    {
        let engine = SyncEngine::from_settings(&settings, &writers).unwrap();
        let result = engine.reconcile(SyncTarget::All, false, None).unwrap();
        assert_eq!(result.added, 1);
    }

    let engine = SyncEngine::from_settings(&settings, &writers).unwrap();
    assert_eq!(engine.gateway().document_count(), 1);
    assert_eq!(engine.status_messages().len(), 1);

    let again = engine.reconcile(SyncTarget::All, false, None).unwrap();
    assert_eq!(again.status, SyncStatus::Success);
    assert_eq!(again.added, 0, "records from the previous run are reused");
}

#[test]
fn test_status_log_is_bounded_and_persisted() {
    let temp = TempDir::new().unwrap();
    let settings = settings_in(&temp);
    let writers = WriterRegistry::with_defaults();

    {
        let engine = SyncEngine::from_settings(&settings, &writers).unwrap();
        for _ in 0..5 {
            engine.reconcile(SyncTarget::All, false, None).unwrap();
        }
        assert_eq!(engine.status_messages().len(), 3);
    }

    let store = KeyValueStore::open(&settings.state_path).unwrap();
    let entries: Vec<StatusEntry> = store.get(STATUS_LOG_KEY).unwrap().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.message.starts_with("Indexing completed")));
}

#[test]
fn test_unknown_writer_key_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut settings = settings_in(&temp);
    settings.directories[0].writer = "xslt".to_string();

    let err = SyncEngine::from_settings(&settings, &WriterRegistry::with_defaults()).unwrap_err();
    assert!(matches!(err, SyncError::Registry(_)));
    assert!(err.to_string().contains("xslt"));
}
