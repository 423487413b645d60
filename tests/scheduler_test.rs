use std::fs;
use std::sync::Arc;
use std::time::Duration;

use metasync::registry::DirectoryRegistry;
use metasync::storage::StatusLog;
use metasync::sync::{EngineOptions, SyncObserver, SyncScheduler, SyncStatus, SyncTarget};
use metasync::writer::{TextWriter, WriterConfig};
use metasync::{IndexGateway, SyncEngine};
use parking_lot::Mutex;
use tempfile::TempDir;

fn scheduler_for(dir: &std::path::Path) -> SyncScheduler {
    let registry = Arc::new(DirectoryRegistry::new());
    registry.register(dir, Arc::new(TextWriter::factory), WriterConfig::new(), None, 5);
    let engine = Arc::new(SyncEngine::new(
        Arc::new(IndexGateway::in_memory().unwrap()),
        registry,
        EngineOptions::default(),
        StatusLog::in_memory(25),
    ));
    SyncScheduler::new(engine).unwrap()
}

#[derive(Default)]
struct Collect(Mutex<Vec<SyncStatus>>);

impl SyncObserver for Collect {
    fn sync_finished(&self, status: SyncStatus, _message: &str) {
        self.0.lock().push(status);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_triggers_serialize() {
    let temp = TempDir::new().unwrap();
    for name in ["a.xml", "b.xml", "c.xml"] {
        fs::write(temp.path().join(name), format!("<title>{name}</title>")).unwrap();
    }
    let scheduler = scheduler_for(temp.path());
    let observer = Arc::new(Collect::default());

    let first = scheduler.trigger_now(SyncTarget::All, false, Some(observer.clone()));
    let second = scheduler.trigger_now(
        SyncTarget::Directory(temp.path().to_path_buf()),
        false,
        Some(observer.clone()),
    );
    let (first, second) = (first.await.unwrap(), second.await.unwrap());

    // Whichever ran first did the work; the other found nothing to do.
    assert_eq!(first.added + second.added, 3);
    assert_eq!(first.status, SyncStatus::Success);
    assert_eq!(second.status, SyncStatus::Success);
    assert_eq!(*observer.0.lock(), vec![SyncStatus::Success; 2]);
    assert_eq!(scheduler.engine().gateway().document_count(), 3);
}

#[tokio::test]
async fn test_timer_picks_up_new_files() {
    let temp = TempDir::new().unwrap();
    let scheduler = scheduler_for(temp.path());
    scheduler.start_with_delay(Duration::from_millis(30), Duration::from_millis(1));

    fs::write(temp.path().join("late.xml"), "<title>late</title>").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.stop().await;

    assert_eq!(scheduler.engine().gateway().document_count(), 1);
    assert!(!scheduler.engine().state().stop_requested(), "stop flag cleared");
    assert!(!scheduler.engine().status_messages().is_empty());
}

#[tokio::test]
async fn test_stop_is_reusable() {
    let temp = TempDir::new().unwrap();
    let scheduler = scheduler_for(temp.path());
    scheduler.stop().await;

    fs::write(temp.path().join("a.xml"), "<title>a</title>").unwrap();
    let result = scheduler
        .trigger_now(SyncTarget::All, false, None)
        .await
        .unwrap();
    assert_eq!(result.status, SyncStatus::Success);
    assert_eq!(result.added, 1);
}
