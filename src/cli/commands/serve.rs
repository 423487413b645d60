//! Serve command: periodic passes, optional watcher, until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::sync::SyncScheduler;
use crate::watcher::DirectoryWatcher;

use super::sync::open_engine;

pub struct ServeArgs {
    pub interval: Option<u64>,
    pub watch: bool,
}

pub async fn run(args: ServeArgs, settings: Settings) -> anyhow::Result<()> {
    let engine = open_engine(&settings)?;
    let scheduler = Arc::new(SyncScheduler::new(engine)?);

    let interval = args.interval.unwrap_or(settings.sync.interval_secs);
    scheduler.start_with_delay(
        Duration::from_secs(interval),
        Duration::from_secs(settings.sync.initial_delay_secs),
    );
    if settings.compaction.enabled {
        scheduler.start_compaction(
            Duration::from_secs(settings.compaction.check_interval_secs),
            Duration::from_secs(settings.compaction.debounce_secs),
        );
    }

    let cancel = CancellationToken::new();
    let watcher_task = if args.watch || settings.watcher.enabled {
        let watcher = DirectoryWatcher::new(Arc::clone(&scheduler), settings.watcher.debounce_ms)?;
        let token = cancel.clone();
        Some(tokio::spawn(async move { watcher.run(token).await }))
    } else {
        None
    };

    crate::log_event!("serve", "running", "interval {interval}s, Ctrl-C to stop");
    eprintln!("metasync is running (interval {interval}s). Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    eprintln!("Stopping, waiting for running passes...");

    cancel.cancel();
    if let Some(task) = watcher_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("[serve] watcher ended with error: {e}"),
            Err(e) => tracing::error!("[serve] watcher task failed: {e}"),
        }
    }
    scheduler.stop().await;
    Ok(())
}
