//! Reconciliation of monitored directories against the index.

pub mod engine;
pub mod error;
pub mod observer;
mod pass;
pub mod scheduler;
pub mod state;
pub mod status;

pub use engine::{EngineOptions, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use observer::{LoggingObserver, SyncObserver};
pub use scheduler::SyncScheduler;
pub use state::{EngineState, PassCounts};
pub use status::{PassResult, SyncStatus, SyncTarget};
