//! Timer-driven and on-demand execution of passes.
//!
//! Passes run on tokio's blocking pool; the engine's sync lock keeps them
//! from overlapping, so a trigger during a running pass simply queues.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::SyncEngine;
use super::error::{SyncError, SyncResult};
use super::observer::{LoggingObserver, SyncObserver};
use super::status::{PassResult, SyncStatus, SyncTarget};

/// Delay before the first timer-driven pass.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(6);

type Task = (CancellationToken, JoinHandle<()>);

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    runtime: Handle,
    timer: Mutex<Option<Task>>,
    compaction: Mutex<Option<Task>>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("timer_running", &self.is_running())
            .field("compaction_running", &self.compaction.lock().is_some())
            .finish()
    }
}

fn cancel_task(slot: &Mutex<Option<Task>>) -> Option<JoinHandle<()>> {
    slot.lock().take().map(|(cancel, handle)| {
        cancel.cancel();
        handle
    })
}

impl SyncScheduler {
    /// Bind to the tokio runtime of the caller.
    pub fn new(engine: Arc<SyncEngine>) -> SyncResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| SyncError::contract(format!("scheduler needs a tokio runtime: {e}")))?;
        Ok(Self::with_handle(engine, runtime))
    }

    pub fn with_handle(engine: Arc<SyncEngine>, runtime: Handle) -> Self {
        Self {
            engine,
            runtime,
            timer: Mutex::new(None),
            compaction: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Whether the periodic timer is armed.
    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Run a full pass every `interval_secs`, the first one after
    /// [`DEFAULT_INITIAL_DELAY`]. Zero disables the timer.
    pub fn start(&self, interval_secs: u64) {
        self.start_with_delay(Duration::from_secs(interval_secs), DEFAULT_INITIAL_DELAY);
    }

    /// Arm the periodic timer, replacing a previous one.
    pub fn start_with_delay(&self, interval: Duration, initial_delay: Duration) {
        if let Some(previous) = cancel_task(&self.timer) {
            previous.abort();
        }
        if interval.is_zero() {
            crate::log_event!("scheduler", "timer disabled");
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = Arc::clone(&self.engine);
        let handle = self.runtime.spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = interval;

                let engine = Arc::clone(&engine);
                let pass = tokio::task::spawn_blocking(move || {
                    engine.reconcile(SyncTarget::All, false, Some(&LoggingObserver))
                });
                match pass.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!("[scheduler] timed pass failed: {e}"),
                    Err(e) => tracing::error!("[scheduler] timed pass panicked: {e}"),
                }
            }
            crate::debug_event!("scheduler", "timer stopped");
        });

        *self.timer.lock() = Some((cancel, handle));
        crate::log_event!(
            "scheduler",
            "timer armed",
            "every {interval:?}, first in {initial_delay:?}"
        );
    }

    /// Run the gateway's compaction monitor alongside the timer.
    pub fn start_compaction(&self, check_interval: Duration, debounce: Duration) {
        if let Some(previous) = cancel_task(&self.compaction) {
            previous.abort();
        }
        let cancel = CancellationToken::new();
        let handle = {
            let _guard = self.runtime.enter();
            self.engine
                .gateway()
                .spawn_compaction_monitor(check_interval, debounce, cancel.clone())
        };
        *self.compaction.lock() = Some((cancel, handle));
    }

    /// Queue a pass right away. The returned handle resolves to its result;
    /// failures to run the pass come back as an `ERROR` result.
    pub fn trigger_now(
        &self,
        target: SyncTarget,
        force: bool,
        observer: Option<Arc<dyn SyncObserver>>,
    ) -> JoinHandle<PassResult> {
        let engine = Arc::clone(&self.engine);
        self.runtime.spawn_blocking(move || {
            match engine.reconcile(target, force, observer.as_deref()) {
                Ok(result) => result,
                Err(e) => PassResult::with_status(SyncStatus::Error, e.to_string()),
            }
        })
    }

    /// Disarm the timer, stop running passes and wait for them to drain.
    pub async fn stop(&self) {
        let timer = cancel_task(&self.timer);

        let engine = Arc::clone(&self.engine);
        if let Err(e) = tokio::task::spawn_blocking(move || engine.stop_and_wait()).await {
            tracing::error!("[scheduler] stop failed: {e}");
        }

        if let Some(handle) = timer {
            let _ = handle.await;
        }
        if let Some(handle) = cancel_task(&self.compaction) {
            let _ = handle.await;
        }
        crate::log_event!("scheduler", "stopped");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        for slot in [&self.timer, &self.compaction] {
            if let Some((cancel, handle)) = slot.lock().take() {
                cancel.cancel();
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexGateway;
    use crate::registry::DirectoryRegistry;
    use crate::storage::StatusLog;
    use crate::sync::EngineOptions;

    fn engine() -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            Arc::new(IndexGateway::in_memory().unwrap()),
            Arc::new(DirectoryRegistry::new()),
            EngineOptions::default(),
            StatusLog::in_memory(10),
        ))
    }

    #[test]
    fn test_new_requires_runtime() {
        assert!(matches!(
            SyncScheduler::new(engine()),
            Err(SyncError::Contract(_))
        ));
    }

    #[tokio::test]
    async fn test_trigger_now_runs_pass() {
        let scheduler = SyncScheduler::new(engine()).unwrap();
        let result = scheduler
            .trigger_now(SyncTarget::All, false, None)
            .await
            .unwrap();
        assert_eq!(result.status, SyncStatus::Success);
        assert!(scheduler.engine().last_sync_time().is_some());
    }

    #[tokio::test]
    async fn test_trigger_unknown_directory_reports_error() {
        let scheduler = SyncScheduler::new(engine()).unwrap();
        let result = scheduler
            .trigger_now(SyncTarget::Directory("/nowhere".into()), false, None)
            .await
            .unwrap();
        assert_eq!(result.status, SyncStatus::Error);
        assert!(result.message.contains("not registered"));
    }

    #[tokio::test]
    async fn test_timer_fires_and_stops() {
        let scheduler = SyncScheduler::new(engine()).unwrap();
        scheduler.start_with_delay(Duration::from_millis(20), Duration::from_millis(1));
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert!(scheduler.engine().last_sync_time().is_some());
        assert!(!scheduler.engine().is_indexing());
    }

    #[tokio::test]
    async fn test_zero_interval_disables_timer() {
        let scheduler = SyncScheduler::new(engine()).unwrap();
        scheduler.start(0);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_compaction_monitor_stops_with_scheduler() {
        let scheduler = SyncScheduler::new(engine()).unwrap();
        scheduler.start_compaction(Duration::from_millis(10), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.stop().await;
        assert!(scheduler.compaction.lock().is_none());
    }
}
