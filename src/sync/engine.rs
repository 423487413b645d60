//! The reconciliation algorithm.
//!
//! A pass diffs the files of a directory against the records indexed for it:
//! new files are added, stale records rebuilt, records without a file removed
//! (or tombstoned when deleted records are preserved). Writer failures become
//! error documents and never abort the pass; index failures do.
//!
//! Every pass, single-file index and removal request holds the engine's sync
//! lock, so at most one of them mutates the index at a time.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use glob::Pattern;
use parking_lot::Mutex;
use walkdir::WalkDir;

use super::error::{SyncError, SyncResult};
use super::observer::{self, SyncObserver};
use super::pass::SyncPass;
use super::state::{EngineState, PassCounts};
use super::status::{PassResult, SyncStatus, SyncTarget};
use crate::config::{Settings, SyncConfig};
use crate::index::record::{fields, mtime_millis, path_key};
use crate::index::{BackendError, Batch, IndexGateway, IndexedRecord};
use crate::registry::{DirectoryRegistry, SourceDirectory, normalize};
use crate::storage::{KeyValueStore, StatusLog};
use crate::writer::error_doc::error_record;
use crate::writer::{
    BuildRequest, Document, DocumentWriter, IndexingPlugin, SessionAttributes, WriterError,
    WriterRegistry,
};

/// Tuning knobs of the engine, resolved from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Staged additions per commit. Already capped when validating.
    pub batch_size: usize,
    pub validate: bool,
    pub preserve_deleted: bool,
    pub index_errors: bool,
    pub unique_id_field: Option<String>,
    /// Empty matches every file.
    pub file_patterns: Vec<Pattern>,
}

impl EngineOptions {
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        if let Some(field) = &config.unique_id_field {
            if !fields::is_keyword(field) {
                return Err(SyncError::contract(format!(
                    "unique_id_field '{field}' is not a keyword field"
                )));
            }
        }
        let file_patterns = config
            .file_patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| SyncError::contract(format!("invalid file pattern '{p}': {e}")))
            })
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self {
            batch_size: config.effective_batch_size(),
            validate: config.validate,
            preserve_deleted: config.preserve_deleted,
            index_errors: config.index_errors,
            unique_id_field: config.unique_id_field.clone(),
            file_patterns,
        })
    }

    fn accepts(&self, file_name: &str) -> bool {
        self.file_patterns.is_empty() || self.file_patterns.iter().any(|p| p.matches(file_name))
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        let config = SyncConfig::default();
        Self {
            batch_size: config.effective_batch_size(),
            validate: config.validate,
            preserve_deleted: config.preserve_deleted,
            index_errors: config.index_errors,
            unique_id_field: None,
            file_patterns: config
                .file_patterns
                .iter()
                .filter_map(|p| Pattern::new(p).ok())
                .collect(),
        }
    }
}

pub struct SyncEngine {
    gateway: Arc<IndexGateway>,
    registry: Arc<DirectoryRegistry>,
    options: EngineOptions,
    state: EngineState,
    sync_lock: Mutex<()>,
    status_log: Mutex<StatusLog>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("in_flight", &self.state.in_flight())
            .finish()
    }
}

/// Result of listing one directory.
#[derive(Debug, Default)]
struct Listing {
    files: Vec<PathBuf>,
    unreadable: Vec<(PathBuf, io::Error)>,
}

/// A file whose record must be rebuilt.
fn is_stale(previous: &IndexedRecord, mtime_ms: i64, force: bool) -> bool {
    force || previous.mtime_ms != mtime_ms || previous.is_error() || previous.deleted
}

impl SyncEngine {
    pub fn new(
        gateway: Arc<IndexGateway>,
        registry: Arc<DirectoryRegistry>,
        options: EngineOptions,
        status_log: StatusLog,
    ) -> Self {
        Self {
            gateway,
            registry,
            options,
            state: EngineState::new(),
            sync_lock: Mutex::new(()),
            status_log: Mutex::new(status_log),
        }
    }

    /// Open the index and state named by `settings` and register its
    /// directories with writers from `writers`.
    pub fn from_settings(settings: &Settings, writers: &WriterRegistry) -> SyncResult<Self> {
        let options = EngineOptions::from_config(&settings.sync)?;
        let gateway = Arc::new(IndexGateway::open(&settings.index_path)?);
        let store = Arc::new(KeyValueStore::open(&settings.state_path)?);
        let status_log = StatusLog::load(store, settings.sync.status_history)?;

        let registry = Arc::new(DirectoryRegistry::new());
        registry.register_all(&settings.directories, writers)?;

        Ok(Self::new(gateway, registry, options, status_log))
    }

    pub fn gateway(&self) -> &Arc<IndexGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<DirectoryRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Whether any pass or request is running or waiting for the lock.
    pub fn is_indexing(&self) -> bool {
        self.state.is_busy()
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.state.last_sync()
    }

    pub fn last_counts(&self) -> PassCounts {
        self.state.last_counts()
    }

    /// Rendered status log, oldest first.
    pub fn status_messages(&self) -> Vec<String> {
        self.status_log.lock().messages()
    }

    /// Ask running passes to stop at their next item.
    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    /// Stop running passes, wait for them to drain, then accept new work.
    pub fn stop_and_wait(&self) {
        self.state.request_stop();
        self.state.wait_idle();
        self.state.clear_stop();
        crate::log_event!("sync", "stopped");
    }

    /// Run one pass over `target` and report its outcome to `observer`.
    ///
    /// The observer is told exactly once, also when the pass is rejected.
    pub fn reconcile(
        &self,
        target: SyncTarget,
        force_all: bool,
        observer: Option<&dyn SyncObserver>,
    ) -> SyncResult<PassResult> {
        let _in_flight = self.state.enter();
        let outcome = self.run_pass(target, force_all);

        let (status, message) = match &outcome {
            Ok(result) => {
                self.state.record_pass(result);
                (result.status, result.message.clone())
            }
            Err(err) => (SyncStatus::Error, err.to_string()),
        };
        self.record_status(&message);
        observer::notify(observer, status, &message);
        outcome
    }

    fn run_pass(&self, target: SyncTarget, force_all: bool) -> SyncResult<PassResult> {
        let _sync = self.sync_lock.lock();
        if self.state.stop_requested() {
            return Ok(PassResult::with_status(
                SyncStatus::Aborted,
                "Indexing was stopped before it started",
            ));
        }

        let directory = match &target {
            SyncTarget::Directory(path) => Some(self.registry.source(path).ok_or_else(|| {
                SyncError::contract(format!("Directory {} is not registered", path.display()))
            })?),
            _ => None,
        };

        self.gateway.wait_until_idle();
        let started = Instant::now();
        let mut total = self.purge_leftovers();
        let mut notes = Vec::new();
        if !total.message.is_empty() {
            notes.push(total.message.clone());
        }

        if matches!(total.status, SyncStatus::Success) {
            let results = match target {
                SyncTarget::All => self.sync_all(force_all),
                SyncTarget::Directory(_) => directory
                    .iter()
                    .map(|dir| self.sync_directory(dir, force_all).0)
                    .collect(),
                SyncTarget::Records(records) => vec![self.sync_records(records, force_all)],
            };
            for result in &results {
                total.absorb(result);
                if !result.status.is_success() && !result.message.is_empty() {
                    notes.push(result.message.clone());
                }
            }
        }

        let headline = match total.status {
            SyncStatus::Success => "Indexing completed".to_string(),
            SyncStatus::Aborted => "Indexing stopped".to_string(),
            status => format!("Indexing finished with {status}"),
        };
        total.message = format!(
            "{headline} in {:.1?}: {}",
            started.elapsed(),
            total.counts_summary()
        );
        if !notes.is_empty() {
            total.message.push_str("; ");
            total.message.push_str(&notes.join("; "));
        }
        crate::log_event!("sync", "pass finished", "{}", total.message);
        Ok(total)
    }

    fn sync_all(&self, force_all: bool) -> Vec<PassResult> {
        let mut results = Vec::new();
        for dir in self.registry.all_bindings() {
            if self.state.stop_requested() {
                results.push(PassResult::with_status(SyncStatus::Aborted, ""));
                break;
            }
            let (result, index_failed) = self.sync_directory(&dir, force_all);
            results.push(result);
            if index_failed {
                break;
            }
        }
        results
    }

    /// Remove the records of directories that are no longer live: either
    /// deregistered or gone from disk.
    fn purge_leftovers(&self) -> PassResult {
        let mut pass = SyncPass::new(&self.gateway, self.options.batch_size);
        let outcome = self.purge_leftovers_inner(&mut pass);
        let (status, message) = match outcome {
            Ok(status) => (status, String::new()),
            Err(err) => (
                SyncStatus::Error,
                format!("Index failure while removing stale directories: {err}"),
            ),
        };
        PassResult {
            status,
            removed: pass.removed,
            message,
            ..PassResult::default()
        }
    }

    fn purge_leftovers_inner(&self, pass: &mut SyncPass<'_>) -> Result<SyncStatus, BackendError> {
        let mut candidates: BTreeSet<PathBuf> = self
            .gateway
            .terms_for_field(fields::PURGE_DIR)?
            .into_iter()
            .map(PathBuf::from)
            .collect();
        candidates.extend(self.registry.history_paths());

        let mut status = SyncStatus::Success;
        for dir in candidates {
            if self.registry.is_registered(&dir) && dir.is_dir() {
                continue;
            }
            let writer = self
                .registry
                .binding_for(&dir)
                .or_else(|| self.registry.historical_binding(&dir))
                .and_then(|binding| match binding.create_writer() {
                    Ok(writer) => Some(writer),
                    Err(e) => {
                        tracing::warn!("[sync] no writer for stale directory {}: {e}", dir.display());
                        None
                    }
                });

            let before = pass.removed;
            let completed = self.sweep(pass, &dir, writer.as_deref(), false)?;
            if pass.removed > before {
                crate::log_event!(
                    "sync",
                    "purged stale directory",
                    "{} ({} records)",
                    dir.display(),
                    pass.removed - before
                );
            }
            if !completed {
                status = SyncStatus::Aborted;
                break;
            }
        }
        pass.flush()?;
        Ok(status)
    }

    /// Stage removal of every live record of `dir`, skipping paths this pass
    /// touched when `skip_touched` is set. Returns `false` when stopped.
    fn sweep(
        &self,
        pass: &mut SyncPass<'_>,
        dir: &Path,
        writer: Option<&dyn DocumentWriter>,
        skip_touched: bool,
    ) -> Result<bool, BackendError> {
        let mut completed = true;
        let gateway = pass.gateway();
        gateway.stream_matching(fields::PURGE_DIR, &path_key(dir), |record| {
            if self.state.stop_requested() {
                completed = false;
                return Ok(ControlFlow::Break(()));
            }
            if skip_touched && pass.was_touched(&record.path_key()) {
                return Ok(ControlFlow::Continue(()));
            }
            self.stage_deletion(pass, record, writer, self.options.preserve_deleted);
            pass.flush_if_full()?;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(completed)
    }

    fn stage_deletion(
        &self,
        pass: &mut SyncPass<'_>,
        record: IndexedRecord,
        writer: Option<&dyn DocumentWriter>,
        preserve: bool,
    ) {
        if preserve {
            if record.deleted {
                return;
            }
            let tombstone = match writer {
                Some(writer) => writer.deleted_document(&record),
                None => record.as_deleted(),
            };
            pass.stage_replace(tombstone);
        } else {
            pass.stage_remove(fields::PATH, record.path_key());
        }
        pass.removed += 1;
    }

    /// Sync one directory. The flag is set when the index itself failed, in
    /// which case no further directory should be attempted.
    fn sync_directory(&self, dir: &SourceDirectory, force_all: bool) -> (PassResult, bool) {
        let mut pass = SyncPass::new(&self.gateway, self.options.batch_size);
        let outcome = self.sync_directory_inner(&mut pass, dir, force_all);
        let index_failed = outcome.is_err();
        let (status, message) = match outcome {
            Ok(outcome) => outcome,
            Err(err) => (
                SyncStatus::Error,
                format!("Index failure while syncing {}: {err}", dir.path.display()),
            ),
        };
        crate::debug_event!(
            "sync",
            "directory done",
            "{} {status}: +{} ~{} -{}",
            dir.path.display(),
            pass.added,
            pass.replaced,
            pass.removed
        );
        let result = PassResult {
            status,
            added: pass.added,
            removed: pass.removed,
            replaced: pass.replaced,
            message,
        };
        (result, index_failed)
    }

    fn sync_directory_inner(
        &self,
        pass: &mut SyncPass<'_>,
        dir: &SourceDirectory,
        force_all: bool,
    ) -> Result<(SyncStatus, String), BackendError> {
        let display = dir.path.display();

        match fs::metadata(&dir.path) {
            Ok(meta) if meta.is_dir() => {}
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Ok((
                    SyncStatus::DirReadError,
                    format!("Cannot read directory {display}: {e}"),
                ));
            }
            _ => {
                let writer = dir.binding.create_writer().ok();
                self.sweep(pass, &dir.path, writer.as_deref(), false)?;
                pass.flush()?;
                return Ok((
                    SyncStatus::DirDoesNotExist,
                    format!("Directory {display} does not exist"),
                ));
            }
        }

        let listing = match self.list_files(&dir.path) {
            Ok(listing) => listing,
            Err(e) => {
                return Ok((
                    SyncStatus::DirReadError,
                    format!("Cannot read directory {display}: {e}"),
                ));
            }
        };
        let mut writer = match dir.binding.create_writer() {
            Ok(writer) => writer,
            Err(e) => {
                return Ok((
                    SyncStatus::Error,
                    format!("Cannot create writer for {display}: {e}"),
                ));
            }
        };

        for (file, source) in listing.unreadable {
            pass.touch(path_key(&file));
            let err = WriterError::Io {
                path: file.clone(),
                source,
            };
            self.record_item_error(pass, &file, &dir.path, 0, err);
            pass.flush_if_full()?;
        }

        let mut status = SyncStatus::Success;
        for file in &listing.files {
            if self.state.stop_requested() {
                status = SyncStatus::Aborted;
                break;
            }
            self.process_file(pass, &mut *writer, dir, file, force_all)?;
            pass.flush_if_full()?;
        }

        if status != SyncStatus::Aborted && !self.sweep(pass, &dir.path, Some(&*writer), true)? {
            status = SyncStatus::Aborted;
        }
        pass.flush()?;

        let mut message = String::new();
        if pass.item_errors > 0 {
            status = status.worst(SyncStatus::ItemError);
            message = format!("{display}: {} file(s) could not be indexed", pass.item_errors);
        }
        Ok((status, message))
    }

    /// Candidate files directly inside `dir`, sorted by name.
    ///
    /// Only a failure to read `dir` itself is an error. Entries that cannot
    /// be inspected, such as dangling symlinks, are returned separately.
    fn list_files(&self, dir: &Path) -> io::Result<Listing> {
        let mut listing = Listing::default();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => match err.path().map(Path::to_path_buf) {
                    Some(path) if err.depth() > 0 => {
                        let accepted = path
                            .file_name()
                            .is_some_and(|name| self.options.accepts(&name.to_string_lossy()));
                        if accepted {
                            listing.unreadable.push((path, io::Error::from(err)));
                        }
                        continue;
                    }
                    _ => return Err(io::Error::from(err)),
                },
            };
            if entry.file_type().is_file() && self.options.accepts(&entry.file_name().to_string_lossy())
            {
                listing.files.push(entry.into_path());
            }
        }
        Ok(listing)
    }

    fn process_file(
        &self,
        pass: &mut SyncPass<'_>,
        writer: &mut dyn DocumentWriter,
        dir: &SourceDirectory,
        file: &Path,
        force_all: bool,
    ) -> Result<(), BackendError> {
        let key = path_key(file);
        pass.touch(key.clone());

        let mtime = match fs::metadata(file).and_then(|meta| mtime_millis(&meta)) {
            Ok(mtime) => mtime,
            Err(source) => {
                let err = WriterError::Io {
                    path: file.to_path_buf(),
                    source,
                };
                self.record_item_error(pass, file, &dir.path, 0, err);
                return Ok(());
            }
        };

        let existing = pass.gateway().find_by_field(fields::PATH, &key)?;
        let previous = match existing.as_slice() {
            [] => None,
            [only] if is_stale(only, mtime, force_all) => Some(only),
            [_] => return Ok(()),
            many => {
                tracing::warn!(
                    "[sync] index inconsistency: {} records for {key}, leaving them alone",
                    many.len()
                );
                return Ok(());
            }
        };

        let built = writer.build(BuildRequest {
            file,
            source_dir: &dir.path,
            previous,
            plugin: dir.binding.plugin.as_deref(),
            session: pass.session_mut(),
            validate: self.options.validate,
        });

        match built {
            Ok(mut doc) => {
                for (field, value) in std::mem::take(&mut doc.also_remove) {
                    pass.stage_remove(&field, value);
                }
                let record = Self::finalize(doc, writer.doc_type(), &dir.path, file, mtime);
                if previous.is_some() {
                    pass.stage_replace(record);
                    pass.replaced += 1;
                } else {
                    for duplicate in self.duplicate_paths(&record)? {
                        crate::debug_event!("sync", "duplicate id", "{duplicate} replaced by {key}");
                        pass.stage_remove(fields::PATH, duplicate);
                        pass.removed += 1;
                    }
                    pass.stage_add(record);
                    pass.added += 1;
                }
            }
            Err(err) => self.record_item_error(pass, file, &dir.path, mtime, err),
        }
        Ok(())
    }

    fn record_item_error(
        &self,
        pass: &mut SyncPass<'_>,
        file: &Path,
        dir: &Path,
        mtime_ms: i64,
        err: WriterError,
    ) {
        tracing::warn!("[sync] {}: {err}", file.display());
        pass.item_errors += 1;
        if self.options.index_errors {
            pass.stage_replace(error_record(file, dir, mtime_ms, &err));
        }
    }

    fn finalize(
        doc: Document,
        doc_type: &str,
        dir: &Path,
        file: &Path,
        mtime_ms: i64,
    ) -> IndexedRecord {
        let mut record = IndexedRecord::new(file, dir, mtime_ms);
        record.doc_type = doc_type.to_string();
        record.id = doc.id;
        record.content = doc.content;
        record.fields = doc.fields;
        record.validation = doc.validation;
        record
    }

    /// Paths of other records sharing `record`'s unique id.
    fn duplicate_paths(&self, record: &IndexedRecord) -> Result<Vec<String>, BackendError> {
        let Some(field) = &self.options.unique_id_field else {
            return Ok(Vec::new());
        };
        let Some(id) = record.keyword(field) else {
            return Ok(Vec::new());
        };
        Ok(self
            .gateway
            .find_by_field(field, &id)?
            .into_iter()
            .filter(|other| other.path != record.path)
            .map(|other| other.path_key())
            .collect())
    }

    fn sync_records(&self, records: Vec<IndexedRecord>, force_all: bool) -> PassResult {
        let mut pass = SyncPass::new(&self.gateway, self.options.batch_size);
        let (status, message) = match self.sync_records_inner(&mut pass, records, force_all) {
            Ok(status) if pass.item_errors > 0 => (
                status.worst(SyncStatus::ItemError),
                format!("{} record(s) could not be reindexed", pass.item_errors),
            ),
            Ok(status) => (status, String::new()),
            Err(err) => (
                SyncStatus::Error,
                format!("Index failure while reindexing records: {err}"),
            ),
        };
        PassResult {
            status,
            added: pass.added,
            removed: pass.removed,
            replaced: pass.replaced,
            message,
        }
    }

    fn sync_records_inner(
        &self,
        pass: &mut SyncPass<'_>,
        records: Vec<IndexedRecord>,
        force_all: bool,
    ) -> Result<SyncStatus, BackendError> {
        let mut writers: HashMap<PathBuf, Option<(SourceDirectory, Box<dyn DocumentWriter>)>> =
            HashMap::new();

        for record in records {
            if self.state.stop_requested() {
                pass.flush()?;
                return Ok(SyncStatus::Aborted);
            }
            let key = record.path_key();
            if !pass.touch(key.clone()) {
                continue;
            }

            if !record.path.is_file() {
                pass.stage_remove(fields::PATH, key);
                pass.removed += 1;
                pass.flush_if_full()?;
                continue;
            }

            let slot = writers.entry(record.dir.clone()).or_insert_with(|| {
                let source = self.registry.source(&record.dir)?;
                match source.binding.create_writer() {
                    Ok(writer) => Some((source, writer)),
                    Err(e) => {
                        tracing::warn!("[sync] cannot create writer for {}: {e}", source.path.display());
                        None
                    }
                }
            });
            let Some((source, writer)) = slot else {
                tracing::warn!(
                    "[sync] {} belongs to no registered directory, skipping",
                    record.path.display()
                );
                pass.item_errors += 1;
                continue;
            };

            self.process_file(pass, &mut **writer, source, &record.path, force_all)?;
            pass.flush_if_full()?;
        }

        pass.flush()?;
        Ok(SyncStatus::Success)
    }

    /// Index one file right away, replacing whatever is indexed for it.
    ///
    /// The file's parent must be a registered directory and its name must
    /// match the file patterns, so the next directory pass keeps the record.
    /// Writer failures are returned, not turned into error documents.
    pub fn index_file(
        &self,
        path: impl AsRef<Path>,
        plugin: Option<Arc<dyn IndexingPlugin>>,
    ) -> SyncResult<IndexedRecord> {
        let _in_flight = self.state.enter();
        if self.state.stop_requested() {
            return Err(SyncError::Aborted);
        }
        let _sync = self.sync_lock.lock();

        let file = normalize(path.as_ref());
        let meta = fs::metadata(&file)
            .map_err(|e| SyncError::contract(format!("Cannot read {}: {e}", file.display())))?;
        if meta.is_dir() {
            return Err(SyncError::contract(format!(
                "{} is a directory, not a file",
                file.display()
            )));
        }
        let accepted = file
            .file_name()
            .is_some_and(|name| self.options.accepts(&name.to_string_lossy()));
        if !accepted {
            return Err(SyncError::contract(format!(
                "{} does not match the configured file patterns",
                file.display()
            )));
        }
        let source = file
            .parent()
            .and_then(|parent| self.registry.source(parent))
            .ok_or_else(|| {
                SyncError::contract(format!(
                    "{} is not inside a registered directory",
                    file.display()
                ))
            })?;
        let mtime = mtime_millis(&meta).map_err(|source| WriterError::Io {
            path: file.clone(),
            source,
        })?;

        let mut writer = source.binding.create_writer()?;
        let previous = self
            .gateway
            .find_by_field(fields::PATH, &path_key(&file))?
            .into_iter()
            .next();
        let plugin = plugin.or_else(|| source.binding.plugin.clone());
        let mut session = SessionAttributes::new();

        let mut doc = writer.build(BuildRequest {
            file: &file,
            source_dir: &source.path,
            previous: previous.as_ref(),
            plugin: plugin.as_deref(),
            session: &mut session,
            validate: self.options.validate,
        })?;

        let mut batch = Batch::new();
        for (field, value) in std::mem::take(&mut doc.also_remove) {
            batch.remove(&field, value);
        }
        let record = Self::finalize(doc, writer.doc_type(), &source.path, &file, mtime);
        for duplicate in self.duplicate_paths(&record)? {
            batch.remove(fields::PATH, duplicate);
        }
        batch.remove(fields::PATH, record.path_key());
        batch.add(record.clone());
        self.gateway.commit_batch(&batch)?;

        self.record_status(&format!("Indexed file {}", file.display()));
        Ok(record)
    }

    /// Remove, or tombstone when `preserve_deleted`, every record whose
    /// keyword `field` matches one of `values`. Returns how many were staged.
    pub fn remove_records(
        &self,
        field: &str,
        values: &[String],
        preserve_deleted: bool,
    ) -> SyncResult<usize> {
        if !fields::is_keyword(field) {
            return Err(SyncError::contract(format!("'{field}' is not a keyword field")));
        }
        let _in_flight = self.state.enter();
        let _sync = self.sync_lock.lock();

        let mut pass = SyncPass::new(&self.gateway, self.options.batch_size);
        for value in values {
            if self.state.stop_requested() {
                break;
            }
            self.gateway.stream_matching(field, value, |record| {
                if self.state.stop_requested() {
                    return Ok(ControlFlow::Break(()));
                }
                self.stage_deletion(&mut pass, record, None, preserve_deleted);
                pass.flush_if_full()?;
                Ok(ControlFlow::Continue(()))
            })?;
        }
        pass.flush()?;

        self.record_status(&format!("Removed {} record(s) where {field} matched", pass.removed));
        Ok(pass.removed)
    }

    /// Reprocess the records whose keyword `field` equals `value`.
    pub fn reindex_matching(
        &self,
        field: &str,
        value: &str,
        force: bool,
        observer: Option<&dyn SyncObserver>,
    ) -> SyncResult<PassResult> {
        if !fields::is_keyword(field) {
            let err = SyncError::contract(format!("'{field}' is not a keyword field"));
            observer::notify(observer, SyncStatus::Error, &err.to_string());
            return Err(err);
        }
        let records = match self.gateway.find_by_field(field, value) {
            Ok(records) => records,
            Err(err) => {
                let err = SyncError::from(err);
                observer::notify(observer, SyncStatus::Error, &err.to_string());
                return Err(err);
            }
        };
        self.reconcile(SyncTarget::Records(records), force, observer)
    }

    /// Reprocess every record matching a search query.
    pub fn reindex_query(
        &self,
        query: &str,
        force: bool,
        observer: Option<&dyn SyncObserver>,
    ) -> SyncResult<PassResult> {
        let limit = usize::try_from(self.gateway.document_count())
            .unwrap_or(usize::MAX)
            .max(1);
        let hits = match self.gateway.search(query, limit) {
            Ok(hits) => hits,
            Err(err) => {
                let err = SyncError::from(err);
                observer::notify(observer, SyncStatus::Error, &err.to_string());
                return Err(err);
            }
        };
        let records = hits.into_iter().map(|hit| hit.record).collect();
        self.reconcile(SyncTarget::Records(records), force, observer)
    }

    fn record_status(&self, message: &str) {
        if let Err(e) = self.status_log.lock().push(message) {
            tracing::warn!("[sync] failed to persist status message: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_rules() {
        let record = IndexedRecord::new("/d/a.xml", "/d", 1_000);
        assert!(!is_stale(&record, 1_000, false));
        assert!(is_stale(&record, 1_000, true));
        assert!(is_stale(&record, 1_001, false));
        assert!(is_stale(&record.as_deleted(), 1_000, false));

        let mut errored = record.clone();
        errored.error = Some(crate::index::ErrorDetails {
            kind: "parse".to_string(),
            message: "bad".to_string(),
            detail: String::new(),
        });
        assert!(is_stale(&errored, 1_000, false));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = SyncConfig::default();
        config.validate = true;
        config.file_patterns = vec!["*.xml".to_string(), "*.json".to_string()];

        let options = EngineOptions::from_config(&config).unwrap();
        assert_eq!(options.batch_size, 100);
        assert!(options.accepts("a.xml"));
        assert!(options.accepts("b.json"));
        assert!(!options.accepts("c.txt"));

        config.file_patterns.clear();
        assert!(EngineOptions::from_config(&config).unwrap().accepts("c.txt"));
    }

    #[test]
    fn test_options_reject_bad_config() {
        let mut config = SyncConfig::default();
        config.unique_id_field = Some("content".to_string());
        assert!(matches!(
            EngineOptions::from_config(&config),
            Err(SyncError::Contract(_))
        ));

        let mut config = SyncConfig::default();
        config.file_patterns = vec!["[".to_string()];
        assert!(EngineOptions::from_config(&config).is_err());
    }
}
