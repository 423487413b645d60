//! Format-specific document construction.
//!
//! The engine never parses files itself. Each monitored directory is bound
//! to a [`WriterFactory`] (chosen by key from a [`WriterRegistry`]) that
//! produces a [`DocumentWriter`] for a pass.

pub mod error;
pub mod error_doc;
pub mod text;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

pub use error::{WriterError, WriterResult};
pub use text::TextWriter;

use crate::index::record::{IndexedRecord, Validation};

/// Free-form configuration handed to a writer factory.
pub type WriterConfig = BTreeMap<String, String>;

/// Attributes shared by writer calls until the next batch flush.
pub type SessionAttributes = HashMap<String, String>;

/// What a writer produces for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: Option<String>,
    pub content: String,
    pub fields: BTreeMap<String, String>,
    pub validation: Option<Validation>,
    /// `(field, value)` pairs of other records to remove alongside this one.
    pub also_remove: Vec<(String, String)>,
}

/// Everything a writer may consult while building a document.
pub struct BuildRequest<'a> {
    pub file: &'a Path,
    pub source_dir: &'a Path,
    /// The record currently indexed for `file`, if any.
    pub previous: Option<&'a IndexedRecord>,
    pub plugin: Option<&'a dyn IndexingPlugin>,
    pub session: &'a mut SessionAttributes,
    pub validate: bool,
}

pub trait DocumentWriter: Send {
    /// Stored as the record's document type.
    fn doc_type(&self) -> &str;

    fn build(&mut self, request: BuildRequest<'_>) -> WriterResult<Document>;

    /// The form a record takes when its file is gone and deleted records
    /// are preserved.
    fn deleted_document(&self, previous: &IndexedRecord) -> IndexedRecord {
        previous.as_deleted()
    }
}

pub trait WriterFactory: Send + Sync {
    fn create(&self, config: &WriterConfig) -> WriterResult<Box<dyn DocumentWriter>>;
}

impl<F> WriterFactory for F
where
    F: Fn(&WriterConfig) -> WriterResult<Box<dyn DocumentWriter>> + Send + Sync,
{
    fn create(&self, config: &WriterConfig) -> WriterResult<Box<dyn DocumentWriter>> {
        self(config)
    }
}

/// Hook passed through to writers, e.g. to contribute extra fields.
pub trait IndexingPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn extra_fields(&self, file: &Path, content: &str) -> BTreeMap<String, String>;
}

/// Writer factories by key.
#[derive(Clone, Default)]
pub struct WriterRegistry {
    factories: HashMap<String, Arc<dyn WriterFactory>>,
}

impl std::fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `text` writer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TextWriter::KEY, Arc::new(TextWriter::factory));
        registry
    }

    /// Register a factory, replacing any previous one under `key`.
    pub fn register(&mut self, key: impl Into<String>, factory: Arc<dyn WriterFactory>) {
        self.factories.insert(key.into(), factory);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn WriterFactory>> {
        self.factories.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
