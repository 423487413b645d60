//! Generic writer for UTF-8 metadata files.
//!
//! Fields are pulled out with regular expressions taken from the writer
//! config:
//!
//! ```toml
//! [[directories]]
//! path = "/data/records"
//! writer = "text"
//! config = { doc_type = "adn", id_pattern = "<id>(.*?)</id>", "field.title" = "<title>(.*?)</title>", required = "title" }
//! ```
//!
//! The first capture group of each pattern is used.

use std::collections::BTreeMap;

use regex::Regex;

use super::{BuildRequest, Document, DocumentWriter, WriterConfig, WriterError, WriterResult};
use crate::index::record::Validation;

const FIELD_PREFIX: &str = "field.";

/// Session key counting documents built since the last flush.
pub const SESSION_BUILT: &str = "text.built";

#[derive(Debug)]
pub struct TextWriter {
    doc_type: String,
    id_pattern: Option<Regex>,
    field_patterns: Vec<(String, Regex)>,
    required: Vec<String>,
}

impl TextWriter {
    pub const KEY: &'static str = "text";

    pub fn from_config(config: &WriterConfig) -> WriterResult<Self> {
        let doc_type = config
            .get("doc_type")
            .cloned()
            .unwrap_or_else(|| Self::KEY.to_string());
        let id_pattern = config.get("id_pattern").map(|p| compile("id_pattern", p)).transpose()?;

        let mut field_patterns = Vec::new();
        for (key, pattern) in config {
            if let Some(name) = key.strip_prefix(FIELD_PREFIX) {
                field_patterns.push((name.to_string(), compile(key, pattern)?));
            }
        }

        let required = config
            .get("required")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            doc_type,
            id_pattern,
            field_patterns,
            required,
        })
    }

    /// [`WriterFactory`](super::WriterFactory) entry point.
    pub fn factory(config: &WriterConfig) -> WriterResult<Box<dyn DocumentWriter>> {
        Ok(Box::new(Self::from_config(config)?))
    }

    fn validate(&self, fields: &BTreeMap<String, String>) -> Validation {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| !fields.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Validation {
                valid: true,
                report: None,
            }
        } else {
            Validation {
                valid: false,
                report: Some(format!("missing required field(s): {}", missing.join(", "))),
            }
        }
    }
}

fn compile(key: &str, pattern: &str) -> WriterResult<Regex> {
    Regex::new(pattern).map_err(|e| WriterError::Config(format!("{key}: {e}")))
}

fn first_capture(pattern: &Regex, content: &str) -> Option<String> {
    pattern
        .captures(content)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

impl DocumentWriter for TextWriter {
    fn doc_type(&self) -> &str {
        &self.doc_type
    }

    fn build(&mut self, request: BuildRequest<'_>) -> WriterResult<Document> {
        let bytes = std::fs::read(request.file).map_err(|source| WriterError::Io {
            path: request.file.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|e| WriterError::Parse {
            path: request.file.to_path_buf(),
            reason: format!("not valid UTF-8: {e}"),
        })?;
        if content.trim().is_empty() {
            return Err(WriterError::Parse {
                path: request.file.to_path_buf(),
                reason: "empty document".to_string(),
            });
        }

        let id = self
            .id_pattern
            .as_ref()
            .and_then(|pattern| first_capture(pattern, &content));

        let mut fields = BTreeMap::new();
        for (name, pattern) in &self.field_patterns {
            if let Some(value) = first_capture(pattern, &content) {
                fields.insert(name.clone(), value);
            }
        }
        if let Some(plugin) = request.plugin {
            fields.extend(plugin.extra_fields(request.file, &content));
        }

        let validation = request.validate.then(|| self.validate(&fields));

        let built = request
            .session
            .get(SESSION_BUILT)
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        request
            .session
            .insert(SESSION_BUILT.to_string(), (built + 1).to_string());

        Ok(Document {
            id,
            content,
            fields,
            validation,
            also_remove: Vec::new(),
        })
    }
}
