//! Triggers a pass for a monitored directory shortly after its files change.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::error::WatchError;
use crate::registry::normalize;
use crate::sync::{LoggingObserver, SyncScheduler, SyncTarget};

const TICK: Duration = Duration::from_millis(100);

pub struct DirectoryWatcher {
    scheduler: Arc<SyncScheduler>,
    debouncer: Debouncer,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    watcher: notify::RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl DirectoryWatcher {
    pub fn new(scheduler: Arc<SyncScheduler>, debounce_ms: u64) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(100);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok(Self {
            scheduler,
            debouncer: Debouncer::new(debounce_ms),
            event_rx: rx,
            watcher,
            watched: HashSet::new(),
        })
    }

    /// Directories currently under watch.
    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }

    /// Bring the watch set in line with the registry.
    pub fn refresh(&mut self) {
        let live: HashSet<PathBuf> = self
            .scheduler
            .engine()
            .registry()
            .all_bindings()
            .into_iter()
            .map(|dir| dir.path)
            .collect();

        let gone: Vec<PathBuf> = self.watched.difference(&live).cloned().collect();
        for dir in gone {
            if let Err(e) = self.watcher.unwatch(&dir) {
                crate::debug_event!("watcher", "unwatch failed", "{}: {e}", dir.display());
            }
            self.debouncer.forget(&dir);
            self.watched.remove(&dir);
        }

        for dir in live {
            if self.watched.contains(&dir) || !dir.is_dir() {
                continue;
            }
            match self.watch_directory(&dir) {
                Ok(()) => {
                    self.watched.insert(dir);
                }
                Err(e) => tracing::warn!("[watcher] {e}"),
            }
        }
    }

    fn watch_directory(&mut self, dir: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        crate::debug_event!("watcher", "watching", "{}", dir.display());
        Ok(())
    }

    /// Watch until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        self.refresh();
        crate::log_event!("watcher", "started", "{} directories", self.watched.len());

        loop {
            let timeout = sleep(TICK);
            tokio::pin!(timeout);

            tokio::select! {
                _ = cancel.cancelled() => break,

                res = self.event_rx.recv() => match res {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => tracing::error!("[watcher] file watch error: {e}"),
                    None => return Err(WatchError::ChannelClosed),
                },

                _ = &mut timeout => {
                    for dir in self.debouncer.take_ready() {
                        self.trigger(dir);
                    }
                    self.refresh();
                }
            }
        }

        crate::log_event!("watcher", "stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        for path in event.paths {
            let path = normalize(&path);
            let dir = if self.watched.contains(&path) {
                Some(path.clone())
            } else {
                path.parent()
                    .filter(|parent| self.watched.contains(*parent))
                    .map(Path::to_path_buf)
            };
            match dir {
                Some(dir) => self.debouncer.record(dir),
                None => crate::debug_event!(
                    "watcher",
                    "unmatched",
                    "{:?} {}",
                    event.kind,
                    path.display()
                ),
            }
        }
    }

    fn trigger(&self, dir: PathBuf) {
        crate::log_event!("watcher", "changed", "{}", dir.display());
        // The pass outcome goes to the logging observer.
        drop(self.scheduler.trigger_now(
            SyncTarget::Directory(dir),
            false,
            Some(Arc::new(LoggingObserver)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexGateway;
    use crate::registry::DirectoryRegistry;
    use crate::storage::StatusLog;
    use crate::sync::{EngineOptions, SyncEngine};
    use crate::writer::{TextWriter, WriterConfig};
    use tempfile::TempDir;

    fn scheduler(registry: Arc<DirectoryRegistry>) -> Arc<SyncScheduler> {
        let engine = Arc::new(SyncEngine::new(
            Arc::new(IndexGateway::in_memory().unwrap()),
            registry,
            EngineOptions::default(),
            StatusLog::in_memory(10),
        ));
        Arc::new(SyncScheduler::new(engine).unwrap())
    }

    #[tokio::test]
    async fn test_refresh_follows_registry() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(DirectoryRegistry::new());
        registry.register(
            temp.path(),
            Arc::new(TextWriter::factory),
            WriterConfig::new(),
            None,
            5,
        );

        let mut watcher = DirectoryWatcher::new(scheduler(Arc::clone(&registry)), 10).unwrap();
        watcher.refresh();
        assert_eq!(watcher.watched().count(), 1);

        registry.deregister(temp.path());
        watcher.refresh();
        assert_eq!(watcher.watched().count(), 0);
    }

    #[tokio::test]
    async fn test_events_are_attributed_to_their_directory() {
        let temp = TempDir::new().unwrap();
        let dir = normalize(temp.path());
        let registry = Arc::new(DirectoryRegistry::new());
        registry.register(&dir, Arc::new(TextWriter::factory), WriterConfig::new(), None, 5);

        let mut watcher = DirectoryWatcher::new(scheduler(registry), 10_000).unwrap();
        watcher.refresh();

        watcher.handle_event(
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(dir.join("a.xml")),
        );
        watcher.handle_event(
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(PathBuf::from("/elsewhere/b.xml")),
        );
        assert_eq!(watcher.debouncer.pending_count(), 1);
    }
}
