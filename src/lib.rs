//! Keeps a searchable index of metadata records consistent with the files
//! in a set of monitored directories.
//!
//! The pieces, leaves first:
//! - [`index::IndexGateway`] serializes commits against a pluggable backend
//!   and hands out lock-free read views.
//! - [`registry::DirectoryRegistry`] holds the monitored directories with
//!   their priorities and writer bindings.
//! - [`sync::SyncEngine`] reconciles directories against the index.
//! - [`sync::SyncScheduler`] runs passes on a timer or on demand.
//! - [`sync::observer`] reports exactly one outcome per pass.

pub mod cli;
pub mod config;
pub mod index;
pub mod logging;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod watcher;
pub mod writer;

pub use config::Settings;
pub use index::{IndexGateway, IndexedRecord, TantivyBackend};
pub use registry::DirectoryRegistry;
pub use sync::{PassResult, SyncEngine, SyncError, SyncScheduler, SyncStatus, SyncTarget};
pub use writer::{DocumentWriter, WriterRegistry};
