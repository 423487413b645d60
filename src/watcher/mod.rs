//! Optional file watching for monitored directories.
//!
//! Changes inside a registered directory trigger a pass for that directory
//! once events have settled. The periodic timer still covers anything the
//! platform watcher misses.

mod debouncer;
mod directory;
mod error;

pub use debouncer::Debouncer;
pub use directory::DirectoryWatcher;
pub use error::WatchError;
