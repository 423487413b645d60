//! Init command.

use std::path::PathBuf;

use crate::config::{CONFIG_DIR, Settings};

/// Create `.metasync/settings.toml` with defaults.
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    let path = Settings::init_config_file(force).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Add directories with 'metasync add-dir <PATH>'.");
    Ok(())
}
