//! A small JSON-file key-value store.
//!
//! The whole map is rewritten on every `put` through a temp file in the same
//! directory and renamed over the target, so readers never see a torn file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;

use super::error::{StoreError, StoreResult};

#[derive(Debug)]
pub struct KeyValueStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl KeyValueStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| StoreError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialization {
            key: key.to_string(),
            source,
        })?;

        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        let mut file = NamedTempFile::new_in(parent).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("state.json");

        let store = KeyValueStore::open(&path).unwrap();
        assert_eq!(store.get::<Vec<String>>("messages").unwrap(), None);
        store
            .put("messages", &vec!["one".to_string(), "two".to_string()])
            .unwrap();
        drop(store);

        let reopened = KeyValueStore::open(&path).unwrap();
        assert_eq!(
            reopened.get::<Vec<String>>("messages").unwrap(),
            Some(vec!["one".to_string(), "two".to_string()])
        );
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            KeyValueStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let store = KeyValueStore::in_memory();
        store.put("count", &3u32).unwrap();
        assert!(store.get::<Vec<String>>("count").is_err());
        assert_eq!(store.get::<u32>("count").unwrap(), Some(3));
    }
}
