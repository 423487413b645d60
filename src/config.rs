//! Configuration module for the metadata synchronization service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `METASYNC_` and use double
//! underscores to separate nested levels:
//! - `METASYNC_SYNC__INTERVAL_SECS=600` sets `sync.interval_secs`
//! - `METASYNC_SYNC__VALIDATE=true` sets `sync.validate`
//! - `METASYNC_COMPACTION__DEBOUNCE_SECS=60` sets `compaction.debounce_secs`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Directory holding the settings file, index and state.
pub const CONFIG_DIR: &str = ".metasync";

/// Batch cap applied when validation is enabled.
pub const VALIDATING_BATCH_CAP: usize = 100;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Path to the persisted key-value state (status log)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Reconciliation settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Background compaction settings
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Filesystem watch trigger
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Monitored directories
    #[serde(default)]
    pub directories: Vec<DirectoryConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Seconds between timer-driven passes. 0 disables the timer.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Delay before the first timer-driven pass
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    /// Maximum staged additions before a commit
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Ask writers to validate documents (caps the batch size)
    #[serde(default = "default_false")]
    pub validate: bool,

    /// Mark removed records as deleted instead of dropping them
    #[serde(default = "default_false")]
    pub preserve_deleted: bool,

    /// Index an error document when a writer fails
    #[serde(default = "default_true")]
    pub index_errors: bool,

    /// Keyword field whose value must be unique across live records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id_field: Option<String>,

    /// File name globs that select candidate files
    #[serde(default = "default_file_patterns")]
    pub file_patterns: Vec<String>,

    /// Number of status messages kept in the persisted log
    #[serde(default = "default_status_history")]
    pub status_history: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often the monitor wakes up
    #[serde(default = "default_compaction_secs")]
    pub check_interval_secs: u64,

    /// Quiet period after the last mutation before compacting
    #[serde(default = "default_compaction_secs")]
    pub debounce_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Logging configuration with per-module levels.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `sync = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DirectoryConfig {
    pub path: PathBuf,

    /// Key into the writer registry
    #[serde(default = "default_writer")]
    pub writer: String,

    /// 0-9, higher runs first
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Passed to the writer factory
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("index")
}
fn default_state_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("state.json")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_initial_delay_secs() -> u64 {
    6
}
fn default_max_batch_size() -> usize {
    500
}
fn default_file_patterns() -> Vec<String> {
    vec!["*.xml".to_string()]
}
fn default_status_history() -> usize {
    25
}
fn default_compaction_secs() -> u64 {
    30 * 60
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_writer() -> String {
    "text".to_string()
}
fn default_priority() -> u8 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            state_path: default_state_path(),
            sync: SyncConfig::default(),
            compaction: CompactionConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
            directories: Vec::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            max_batch_size: default_max_batch_size(),
            validate: false,
            preserve_deleted: false,
            index_errors: true,
            unique_id_field: None,
            file_patterns: default_file_patterns(),
            status_history: default_status_history(),
        }
    }
}

impl SyncConfig {
    /// Batch size actually used by a pass.
    ///
    /// Validation keeps whole documents around for reporting, so the batch is
    /// capped at [`VALIDATING_BATCH_CAP`]. Never returns zero.
    pub fn effective_batch_size(&self) -> usize {
        let size = if self.validate {
            self.max_batch_size.min(VALIDATING_BATCH_CAP)
        } else {
            self.max_batch_size
        };
        size.max(1)
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_compaction_secs(),
            debounce_secs: default_compaction_secs(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(Self::config_path())
    }

    /// The settings file of the enclosing workspace, or the default
    /// location under the current directory.
    pub fn config_path() -> PathBuf {
        Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"))
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels,
            // single underscores stay inside field names
            .merge(Env::prefixed("METASYNC_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.metasync` directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `.metasync/`
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
