use metasync::Settings;
use std::env;
use tempfile::TempDir;

#[test]
fn test_env_overrides_file_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &config_path,
        r#"
[sync]
interval_secs = 60
max_batch_size = 200

[[directories]]
path = "/data/feeds"
priority = 8
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("METASYNC_SYNC__MAX_BATCH_SIZE", "42");
        env::set_var("METASYNC_SYNC__PRESERVE_DELETED", "true");
        env::set_var("METASYNC_WATCHER__DEBOUNCE_MS", "250");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("METASYNC_SYNC__MAX_BATCH_SIZE");
        env::remove_var("METASYNC_SYNC__PRESERVE_DELETED");
        env::remove_var("METASYNC_WATCHER__DEBOUNCE_MS");
    }

    assert_eq!(settings.sync.interval_secs, 60, "file value kept");
    assert_eq!(settings.sync.max_batch_size, 42, "env beats file");
    assert!(settings.sync.preserve_deleted);
    assert_eq!(settings.watcher.debounce_ms, 250);
    assert_eq!(settings.directories.len(), 1);
    assert_eq!(settings.directories[0].writer, "text");
    assert_eq!(settings.directories[0].priority, 8);
}
