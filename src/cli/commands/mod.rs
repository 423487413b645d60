//! Command implementations for the CLI, one module per command group.

pub mod directories;
pub mod init;
pub mod serve;
pub mod status;
pub mod sync;
