//! Persisted service state outside the index.

pub mod error;
pub mod kv;
pub mod status_log;

pub use error::{StoreError, StoreResult};
pub use kv::KeyValueStore;
pub use status_log::{STATUS_LOG_KEY, StatusEntry, StatusLog};
