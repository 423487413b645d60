//! Sync, index-file and search commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::index::fields;
use crate::sync::{LoggingObserver, SyncEngine, SyncStatus, SyncTarget};
use crate::writer::WriterRegistry;

pub fn open_engine(settings: &Settings) -> anyhow::Result<Arc<SyncEngine>> {
    let writers = WriterRegistry::with_defaults();
    Ok(Arc::new(SyncEngine::from_settings(settings, &writers)?))
}

/// Run one pass and print its outcome. Fails unless the pass succeeded
/// or only individual files failed.
pub fn run_sync(settings: &Settings, dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    if engine.registry().is_empty() {
        println!("No directories are monitored. Add one with 'metasync add-dir <PATH>'.");
        return Ok(());
    }

    let target = match dir {
        Some(dir) => SyncTarget::Directory(dir),
        None => SyncTarget::All,
    };
    let result = engine.reconcile(target, force, Some(&LoggingObserver))?;

    println!("{}: {}", result.status, result.message);
    match result.status {
        SyncStatus::Success | SyncStatus::ItemError => Ok(()),
        status => anyhow::bail!("sync finished with {status}"),
    }
}

pub fn run_index_file(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let record = engine.index_file(path, None)?;
    println!(
        "Indexed {} as {}{}",
        record.path.display(),
        record.doc_type,
        record
            .id
            .as_deref()
            .map(|id| format!(" (id {id})"))
            .unwrap_or_default()
    );
    Ok(())
}

pub fn run_search(
    settings: &Settings,
    query: &str,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let hits = engine.gateway().search(query, limit)?;

    if json {
        for hit in &hits {
            println!(
                "{}",
                serde_json::json!({ "score": hit.score, "record": hit.record })
            );
        }
        return Ok(());
    }

    if hits.is_empty() {
        println!("No records match '{query}'.");
        return Ok(());
    }
    for hit in &hits {
        let marker = if hit.record.is_error() {
            " [error]"
        } else if hit.record.deleted {
            " [deleted]"
        } else {
            ""
        };
        println!(
            "{:>7.3}  {}{marker}",
            hit.score,
            hit.record.path.display()
        );
        if let Some(id) = hit.record.keyword(fields::ID) {
            println!("         id: {id}");
        }
    }
    Ok(())
}
