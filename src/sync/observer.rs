//! Delivery of the one terminal status a pass produces.

use std::panic::{AssertUnwindSafe, catch_unwind};

use super::status::SyncStatus;

/// Receives the outcome of a pass.
pub trait SyncObserver: Send + Sync {
    fn sync_finished(&self, status: SyncStatus, message: &str);
}

impl<F> SyncObserver for F
where
    F: Fn(SyncStatus, &str) + Send + Sync,
{
    fn sync_finished(&self, status: SyncStatus, message: &str) {
        self(status, message)
    }
}

/// Writes outcomes to the log. Used for timer-driven passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SyncObserver for LoggingObserver {
    fn sync_finished(&self, status: SyncStatus, message: &str) {
        match status {
            SyncStatus::Success => crate::log_event!("sync", "finished", "{message}"),
            SyncStatus::ItemError | SyncStatus::Aborted => {
                tracing::warn!("[sync] finished with {status}: {message}")
            }
            _ => tracing::error!("[sync] finished with {status}: {message}"),
        }
    }
}

/// Hand the outcome to `observer`. A panicking observer is logged and
/// otherwise ignored.
pub fn notify(observer: Option<&dyn SyncObserver>, status: SyncStatus, message: &str) {
    let Some(observer) = observer else {
        return;
    };
    let delivered = catch_unwind(AssertUnwindSafe(|| observer.sync_finished(status, message)));
    if let Err(panic) = delivered {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("[sync] observer panicked on {status}: {reason}");
    }
}
