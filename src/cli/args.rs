//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Keeps a metadata index in sync with monitored directories
#[derive(Parser, Debug)]
#[command(
    name = "metasync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep a metadata index in sync with monitored directories",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "METASYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up .metasync directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Add a directory to the monitored set
    AddDir {
        path: PathBuf,

        /// Writer key used to build records for this directory
        #[arg(short, long, default_value = "text")]
        writer: String,

        /// 0-9, higher is synced first
        #[arg(short, long, default_value_t = 5)]
        priority: u8,
    },

    /// Remove a directory from the monitored set
    RemoveDir { path: PathBuf },

    /// List monitored directories
    ListDirs,

    /// Run one reconciliation pass
    Sync {
        /// Only this registered directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Rebuild every record, stale or not
        #[arg(short, long)]
        force: bool,
    },

    /// Index a single file right away
    IndexFile { path: PathBuf },

    /// Search indexed records
    Search {
        query: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print hits as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show index size, last pass and recent status messages
    Status,

    /// Run the periodic timer (and the watcher if enabled) until Ctrl-C
    Serve {
        /// Override sync.interval_secs
        #[arg(long)]
        interval: Option<u64>,

        /// Watch monitored directories for changes
        #[arg(long)]
        watch: bool,
    },
}
