//! Concurrency-safe facade over an index backend.
//!
//! Two locks with different scopes:
//! - the update lock owns the backend and serializes every commit and
//!   compaction;
//! - the view lock only guards swapping the `Arc` of the live view.
//!
//! Readers clone the current view and search without holding either lock,
//! so a reader sees either the whole of a committed batch or none of it.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::backend::{IndexBackend, IndexView, SearchHit};
use super::error::BackendResult;
use super::record::IndexedRecord;
use super::tantivy::TantivyBackend;

/// Attempts made by [`IndexGateway::search`] before giving up.
pub const SEARCH_ATTEMPTS: usize = 3;

/// Removals and additions committed together.
///
/// Removals are applied before additions, so a batch may remove a path and
/// add its replacement.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    removals: BTreeMap<String, Vec<String>>,
    additions: Vec<IndexedRecord>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, field: &str, value: impl Into<String>) {
        self.removals
            .entry(field.to_string())
            .or_default()
            .push(value.into());
    }

    pub fn add(&mut self, record: IndexedRecord) {
        self.additions.push(record);
    }

    pub fn additions(&self) -> &[IndexedRecord] {
        &self.additions
    }

    pub fn removal_count(&self) -> usize {
        self.removals.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    pub fn clear(&mut self) {
        self.removals.clear();
        self.additions.clear();
    }
}

#[derive(Debug)]
struct CompactionState {
    dirty: bool,
    last_mutation: Instant,
}

pub struct IndexGateway {
    backend: Mutex<Box<dyn IndexBackend>>,
    view: RwLock<Arc<dyn IndexView>>,
    version: AtomicU64,
    compaction: Mutex<CompactionState>,
}

impl std::fmt::Debug for IndexGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexGateway")
            .field("version", &self.current_version())
            .field("compaction", &*self.compaction.lock())
            .finish()
    }
}

impl IndexGateway {
    pub fn new(backend: Box<dyn IndexBackend>) -> BackendResult<Self> {
        let view = backend.open_view()?;
        Ok(Self {
            backend: Mutex::new(backend),
            view: RwLock::new(view),
            version: AtomicU64::new(0),
            compaction: Mutex::new(CompactionState {
                dirty: false,
                last_mutation: Instant::now(),
            }),
        })
    }

    /// Open a tantivy index on disk.
    pub fn open(index_path: impl AsRef<Path>) -> BackendResult<Self> {
        Self::new(Box::new(TantivyBackend::open(index_path)?))
    }

    pub fn in_memory() -> BackendResult<Self> {
        Self::new(Box::new(TantivyBackend::in_memory()?))
    }

    /// Remove every record whose `remove_field` matches one of
    /// `remove_values`, then add `additions`, as one atomic commit.
    pub fn commit(
        &self,
        remove_field: &str,
        remove_values: &[String],
        additions: &[IndexedRecord],
    ) -> BackendResult<()> {
        let mut batch = Batch::new();
        for value in remove_values {
            batch.remove(remove_field, value.as_str());
        }
        for record in additions {
            batch.add(record.clone());
        }
        self.commit_batch(&batch)
    }

    /// Apply a batch atomically and publish the new view.
    ///
    /// On failure the backend is rolled back and the live view is untouched.
    /// Once the backend commit succeeds the version advances even if the new
    /// view cannot be opened; the old view then stays live until the next
    /// commit and the error is returned.
    pub fn commit_batch(&self, batch: &Batch) -> BackendResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut backend = self.backend.lock();
        if let Err(err) = Self::apply(backend.as_mut(), batch) {
            if let Err(rollback_err) = backend.rollback() {
                tracing::error!("[gateway] rollback after failed commit also failed: {rollback_err}");
            }
            return Err(err);
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut compaction = self.compaction.lock();
            compaction.dirty = true;
            compaction.last_mutation = Instant::now();
        }
        match backend.open_view() {
            Ok(view) => *self.view.write() = view,
            Err(err) => {
                tracing::error!("[gateway] version {version} committed but its view failed to open: {err}");
                return Err(err);
            }
        }

        crate::debug_event!(
            "gateway",
            "committed",
            "version {version}: -{} +{}",
            batch.removal_count(),
            batch.additions.len()
        );
        Ok(())
    }

    fn apply(backend: &mut dyn IndexBackend, batch: &Batch) -> BackendResult<()> {
        for (field, values) in &batch.removals {
            backend.remove_by_field_value(field, values)?;
        }
        for record in &batch.additions {
            backend.add_document(record)?;
        }
        backend.commit()
    }

    /// Remove records by one keyword field.
    pub fn remove_by_field(&self, field: &str, values: &[String]) -> BackendResult<()> {
        self.commit(field, values, &[])
    }

    /// The live read view. Holding it pins one index generation.
    pub fn current_view(&self) -> Arc<dyn IndexView> {
        Arc::clone(&self.view.read())
    }

    /// Number of successful commits since the gateway was opened.
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Search the live view, retrying transient failures.
    pub fn search(&self, query: &str, limit: usize) -> BackendResult<Vec<SearchHit>> {
        let mut attempt = 1;
        loop {
            match self.current_view().search(query, limit) {
                Ok(hits) => return Ok(hits),
                Err(err) if err.is_retryable() && attempt < SEARCH_ATTEMPTS => {
                    crate::debug_event!(
                        "gateway",
                        "search retry",
                        "attempt {attempt} for '{query}' failed: {err}"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Visit records whose keyword `field` equals `value`, one at a time.
    pub fn stream_matching<F>(&self, field: &str, value: &str, mut visitor: F) -> BackendResult<()>
    where
        F: FnMut(IndexedRecord) -> BackendResult<ControlFlow<()>>,
    {
        self.current_view()
            .stream_by_field_value(field, value, &mut visitor)
    }

    pub fn find_by_field(&self, field: &str, value: &str) -> BackendResult<Vec<IndexedRecord>> {
        let mut found = Vec::new();
        self.stream_matching(field, value, |record| {
            found.push(record);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(found)
    }

    pub fn terms_for_field(&self, field: &str) -> BackendResult<Vec<String>> {
        self.current_view().all_terms_for_field(field)
    }

    pub fn document_count(&self) -> u64 {
        self.current_view().document_count()
    }

    /// Block until no commit or compaction is running.
    pub fn wait_until_idle(&self) {
        drop(self.backend.lock());
    }

    /// Compact if the index changed and has been quiet for `debounce`.
    ///
    /// Returns whether a compaction ran. A failed compaction restarts the
    /// quiet period.
    pub fn maybe_compact(&self, debounce: Duration) -> BackendResult<bool> {
        if !self.compaction_due(debounce) {
            return Ok(false);
        }

        let mut backend = self.backend.lock();
        // A commit may have landed while we waited for the lock.
        if !self.compaction_due(debounce) {
            return Ok(false);
        }

        let started = Instant::now();
        let result = backend.compact().and_then(|()| backend.open_view());
        match result {
            Ok(view) => {
                *self.view.write() = view;
                self.compaction.lock().dirty = false;
                crate::log_event!("gateway", "compacted", "in {:?}", started.elapsed());
                Ok(true)
            }
            Err(err) => {
                self.compaction.lock().last_mutation = Instant::now();
                Err(err)
            }
        }
    }

    fn compaction_due(&self, debounce: Duration) -> bool {
        let state = self.compaction.lock();
        state.dirty && state.last_mutation.elapsed() >= debounce
    }

    /// Run [`maybe_compact`](Self::maybe_compact) every `interval` until
    /// `cancel` fires. Must be called within a tokio runtime.
    pub fn spawn_compaction_monitor(
        self: &Arc<Self>,
        interval: Duration,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let gw = Arc::clone(&gateway);
                        match tokio::task::spawn_blocking(move || gw.maybe_compact(debounce)).await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::warn!("[gateway] compaction failed: {e}"),
                            Err(e) => tracing::error!("[gateway] compaction task panicked: {e}"),
                        }
                    }
                }
            }
            crate::debug_event!("gateway", "compaction monitor stopped");
        })
    }
}
