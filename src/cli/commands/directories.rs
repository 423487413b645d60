//! Directory management commands (add-dir, remove-dir, list-dirs).
//!
//! These edit the `[[directories]]` section of the settings file; the next
//! pass picks the change up.

use std::path::Path;

use anyhow::Context;

use crate::config::{DirectoryConfig, Settings};
use crate::registry::{MAX_PRIORITY, normalize};
use crate::writer::WriterRegistry;

/// Add `path` to the settings at `config_path` and save them.
pub fn add_dir(
    config_path: &Path,
    path: &Path,
    writer: &str,
    priority: u8,
    writers: &WriterRegistry,
) -> anyhow::Result<DirectoryConfig> {
    if !path.is_dir() {
        anyhow::bail!("Path must be an existing directory: {}", path.display());
    }
    if writers.get(writer).is_none() {
        anyhow::bail!(
            "Unknown writer '{writer}' (available: {})",
            writers.keys().join(", ")
        );
    }
    if priority > MAX_PRIORITY {
        anyhow::bail!("Priority must be between 0 and {MAX_PRIORITY}, got {priority}");
    }

    let mut settings = Settings::load_from(config_path)
        .map_err(|e| anyhow::anyhow!("Error loading configuration: {e}"))?;
    let path = normalize(path);
    if settings
        .directories
        .iter()
        .any(|dir| normalize(&dir.path) == path)
    {
        anyhow::bail!("Directory is already monitored: {}", path.display());
    }

    let entry = DirectoryConfig {
        path,
        writer: writer.to_string(),
        priority,
        config: Default::default(),
    };
    settings.directories.push(entry.clone());
    settings
        .save(config_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("saving {}", config_path.display()))?;
    Ok(entry)
}

/// Remove `path` from the settings. Returns whether it was listed.
pub fn remove_dir(config_path: &Path, path: &Path) -> anyhow::Result<bool> {
    let mut settings = Settings::load_from(config_path)
        .map_err(|e| anyhow::anyhow!("Error loading configuration: {e}"))?;
    let path = normalize(path);
    let before = settings.directories.len();
    settings.directories.retain(|dir| normalize(&dir.path) != path);
    if settings.directories.len() == before {
        return Ok(false);
    }
    settings
        .save(config_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("saving {}", config_path.display()))?;
    Ok(true)
}

pub fn list_dirs(settings: &Settings) {
    if settings.directories.is_empty() {
        println!("No directories are monitored. Add one with 'metasync add-dir <PATH>'.");
        return;
    }
    let mut dirs: Vec<&DirectoryConfig> = settings.directories.iter().collect();
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.priority));
    println!("Monitored directories ({}):", dirs.len());
    for dir in dirs {
        let missing = if dir.path.is_dir() { "" } else { "  (missing)" };
        println!(
            "  [{}] {}  writer={}{missing}",
            dir.priority,
            dir.path.display(),
            dir.writer
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_and_remove_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".metasync/settings.toml");
        Settings::default().save(&config_path).unwrap();
        let data = temp.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let writers = WriterRegistry::with_defaults();

        let entry = add_dir(&config_path, &data, "text", 7, &writers).unwrap();
        assert_eq!(entry.priority, 7);

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.directories.len(), 1);
        assert_eq!(settings.directories[0].writer, "text");

        assert!(add_dir(&config_path, &data, "text", 7, &writers).is_err());
        assert!(remove_dir(&config_path, &data).unwrap());
        assert!(!remove_dir(&config_path, &data).unwrap());
        assert!(Settings::load_from(&config_path).unwrap().directories.is_empty());
    }

    #[test]
    fn test_add_dir_rejects_bad_input() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("settings.toml");
        let writers = WriterRegistry::with_defaults();

        assert!(add_dir(&config_path, &temp.path().join("nope"), "text", 5, &writers).is_err());
        assert!(add_dir(&config_path, temp.path(), "xslt", 5, &writers).is_err());
        assert!(add_dir(&config_path, temp.path(), "text", 12, &writers).is_err());
    }
}
