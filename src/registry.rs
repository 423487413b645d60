//! The set of monitored directories.
//!
//! Paths are made absolute on the way in and are unique. Deregistered
//! directories move to a history map so a later pass can still reach the
//! writer that indexed their records when it cleans them up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::config::DirectoryConfig;
use crate::writer::{
    DocumentWriter, IndexingPlugin, WriterConfig, WriterFactory, WriterRegistry, WriterResult,
};

pub const DEFAULT_PRIORITY: u8 = 5;
pub const MAX_PRIORITY: u8 = 9;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No writer registered under '{key}' (directory {path})")]
    UnknownWriter { key: String, path: PathBuf },
}

/// How records of one directory are built.
#[derive(Clone)]
pub struct WriterBinding {
    pub factory: Arc<dyn WriterFactory>,
    pub config: WriterConfig,
    pub plugin: Option<Arc<dyn IndexingPlugin>>,
}

impl std::fmt::Debug for WriterBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterBinding")
            .field("config", &self.config)
            .field("plugin", &self.plugin.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl WriterBinding {
    pub fn create_writer(&self) -> WriterResult<Box<dyn DocumentWriter>> {
        self.factory.create(&self.config)
    }
}

#[derive(Debug, Clone)]
pub struct SourceDirectory {
    pub path: PathBuf,
    /// 0-9, higher is visited first.
    pub priority: u8,
    pub binding: WriterBinding,
    /// Registration order, used to break priority ties.
    pub sequence: u64,
}

#[derive(Default)]
struct RegistryInner {
    live: IndexMap<PathBuf, SourceDirectory>,
    history: HashMap<PathBuf, SourceDirectory>,
    next_sequence: u64,
}

#[derive(Default)]
pub struct DirectoryRegistry {
    inner: RwLock<RegistryInner>,
}

impl std::fmt::Debug for DirectoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DirectoryRegistry")
            .field("live", &inner.live.keys().collect::<Vec<_>>())
            .field("history", &inner.history.len())
            .finish()
    }
}

/// Absolute form of `path` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, or replace the binding of an already registered one.
    ///
    /// Returns `true` when the directory was not registered before.
    /// Replacing keeps the original registration order.
    pub fn register(
        &self,
        path: impl AsRef<Path>,
        factory: Arc<dyn WriterFactory>,
        config: WriterConfig,
        plugin: Option<Arc<dyn IndexingPlugin>>,
        priority: u8,
    ) -> bool {
        let path = normalize(path.as_ref());
        let binding = WriterBinding {
            factory,
            config,
            plugin,
        };
        let priority = priority.min(MAX_PRIORITY);

        let mut inner = self.inner.write();
        inner.history.remove(&path);

        if let Some(existing) = inner.live.get_mut(&path) {
            existing.binding = binding;
            existing.priority = priority;
            crate::debug_event!("registry", "rebound", "{}", path.display());
            return false;
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        crate::log_event!(
            "registry",
            "registered",
            "{} (priority {priority})",
            path.display()
        );
        inner.live.insert(
            path.clone(),
            SourceDirectory {
                path,
                priority,
                binding,
                sequence,
            },
        );
        true
    }

    /// Register every configured directory with a factory from `writers`.
    pub fn register_all(
        &self,
        directories: &[DirectoryConfig],
        writers: &WriterRegistry,
    ) -> Result<usize, RegistryError> {
        for dir in directories {
            let factory = writers
                .get(&dir.writer)
                .ok_or_else(|| RegistryError::UnknownWriter {
                    key: dir.writer.clone(),
                    path: dir.path.clone(),
                })?;
            self.register(&dir.path, factory, dir.config.clone(), None, dir.priority);
        }
        Ok(directories.len())
    }

    /// Stop monitoring `path`. Its records stay in the index until the next
    /// pass cleans them up.
    pub fn deregister(&self, path: impl AsRef<Path>) -> bool {
        let path = normalize(path.as_ref());
        let mut inner = self.inner.write();
        match inner.live.shift_remove(&path) {
            Some(dir) => {
                crate::log_event!("registry", "deregistered", "{}", path.display());
                inner.history.insert(path, dir);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, path: impl AsRef<Path>) -> bool {
        self.inner.read().live.contains_key(&normalize(path.as_ref()))
    }

    pub fn source(&self, path: impl AsRef<Path>) -> Option<SourceDirectory> {
        self.inner.read().live.get(&normalize(path.as_ref())).cloned()
    }

    pub fn binding_for(&self, path: impl AsRef<Path>) -> Option<WriterBinding> {
        self.source(path).map(|dir| dir.binding)
    }

    /// Binding of a deregistered directory.
    pub fn historical_binding(&self, path: impl AsRef<Path>) -> Option<WriterBinding> {
        self.inner
            .read()
            .history
            .get(&normalize(path.as_ref()))
            .map(|dir| dir.binding.clone())
    }

    /// Paths of all deregistered directories.
    pub fn history_paths(&self) -> Vec<PathBuf> {
        self.inner.read().history.keys().cloned().collect()
    }

    /// Live directories, highest priority first, ties in registration order.
    pub fn all_bindings(&self) -> Vec<SourceDirectory> {
        let mut dirs: Vec<SourceDirectory> = self.inner.read().live.values().cloned().collect();
        dirs.sort_by_key(|dir| (std::cmp::Reverse(dir.priority), dir.sequence));
        dirs
    }

    pub fn len(&self) -> usize {
        self.inner.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::TextWriter;

    fn text_factory() -> Arc<dyn WriterFactory> {
        Arc::new(TextWriter::factory)
    }

    fn register(registry: &DirectoryRegistry, path: &str, priority: u8) -> bool {
        registry.register(path, text_factory(), WriterConfig::new(), None, priority)
    }

    fn order(registry: &DirectoryRegistry) -> Vec<PathBuf> {
        registry.all_bindings().into_iter().map(|d| d.path).collect()
    }

    #[test]
    fn test_priority_then_registration_order() {
        let registry = DirectoryRegistry::new();
        register(&registry, "/data/low", 1);
        register(&registry, "/data/mid-a", 5);
        register(&registry, "/data/high", 9);
        register(&registry, "/data/mid-b", 5);

        assert_eq!(
            order(&registry),
            vec![
                PathBuf::from("/data/high"),
                PathBuf::from("/data/mid-a"),
                PathBuf::from("/data/mid-b"),
                PathBuf::from("/data/low"),
            ]
        );
    }

    #[test]
    fn test_reregister_replaces_binding_in_place() {
        let registry = DirectoryRegistry::new();
        assert!(register(&registry, "/data/a", 5));
        assert!(register(&registry, "/data/b", 5));

        let mut config = WriterConfig::new();
        config.insert("doc_type".to_string(), "adn".to_string());
        assert!(!registry.register("/data/a", text_factory(), config, None, 5));

        assert_eq!(registry.len(), 2);
        assert_eq!(order(&registry)[0], PathBuf::from("/data/a"));
        let binding = registry.binding_for("/data/a").unwrap();
        assert_eq!(binding.config.get("doc_type").map(String::as_str), Some("adn"));
    }

    #[test]
    fn test_priority_is_clamped() {
        let registry = DirectoryRegistry::new();
        register(&registry, "/data/a", 42);
        assert_eq!(registry.source("/data/a").unwrap().priority, MAX_PRIORITY);
    }

    #[test]
    fn test_deregister_keeps_history() {
        let registry = DirectoryRegistry::new();
        register(&registry, "/data/a", 5);

        assert!(registry.deregister("/data/a"));
        assert!(!registry.deregister("/data/a"));
        assert!(!registry.is_registered("/data/a"));
        assert!(registry.binding_for("/data/a").is_none());
        assert!(registry.historical_binding("/data/a").is_some());
        assert_eq!(registry.history_paths(), vec![PathBuf::from("/data/a")]);

        register(&registry, "/data/a", 5);
        assert!(registry.historical_binding("/data/a").is_none());
    }

    #[test]
    fn test_relative_paths_are_made_absolute() {
        let registry = DirectoryRegistry::new();
        register(&registry, "relative/dir", 5);

        let expected = std::env::current_dir().unwrap().join("relative/dir");
        assert!(registry.is_registered(&expected));
        assert!(registry.is_registered("relative/dir"));
    }

    #[test]
    fn test_register_all_rejects_unknown_writer() {
        let registry = DirectoryRegistry::new();
        let writers = WriterRegistry::with_defaults();
        let dirs = vec![DirectoryConfig {
            path: PathBuf::from("/data/a"),
            writer: "marc".to_string(),
            priority: 5,
            config: WriterConfig::new(),
        }];

        let err = registry.register_all(&dirs, &writers).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownWriter { key, .. } if key == "marc"));
        assert!(registry.is_empty());
    }
}
