//! Tantivy schema for indexed records.
//!
//! Keyword fields are indexed as raw terms so they can be used for removal,
//! streaming and term listing. `content` and the writer-supplied fields are
//! tokenized for search.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tantivy::TantivyDocument as Document;
use tantivy::schema::{
    FAST, Field, IndexRecordOption, NumericOptions, STORED, STRING, Schema, SchemaBuilder,
    TextFieldIndexing, TextOptions, Value,
};

use super::error::{BackendError, BackendResult};
use super::record::{ErrorDetails, IndexedRecord, Validation, fields, flag, path_key};

/// Schema fields for record storage.
#[derive(Debug)]
pub struct RecordSchema {
    pub path: Field,
    pub file_name: Field,
    pub dir: Field,
    pub purge_dir: Field,
    pub deleted: Field,
    pub error: Field,
    pub doc_type: Field,
    pub id: Field,
    pub valid: Field,
    pub error_kind: Field,

    /// Modification time in milliseconds.
    pub mtime: Field,
    /// Indexing timestamp in milliseconds.
    pub indexed_at: Field,

    pub content: Field,
    /// Writer fields as JSON, for retrieval.
    pub fields_json: Field,
    /// Writer field values, tokenized for search.
    pub fields_text: Field,

    pub error_message: Field,
    pub error_detail: Field,
    pub validation_report: Field,
}

impl RecordSchema {
    /// Build the schema for record storage.
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();

        let keyword = STRING | STORED;
        let path = builder.add_text_field(fields::PATH, keyword.clone());
        let file_name = builder.add_text_field(fields::FILE_NAME, keyword.clone());
        let dir = builder.add_text_field(fields::DIR, keyword.clone());
        let purge_dir = builder.add_text_field(fields::PURGE_DIR, keyword.clone());
        let deleted = builder.add_text_field(fields::DELETED, keyword.clone());
        let error = builder.add_text_field(fields::ERROR, keyword.clone());
        let doc_type = builder.add_text_field(fields::DOC_TYPE, STRING | STORED | FAST);
        let id = builder.add_text_field(fields::ID, keyword.clone());
        let valid = builder.add_text_field(fields::VALID, keyword.clone());
        let error_kind = builder.add_text_field(fields::ERROR_KIND, keyword);

        let indexed_i64 = NumericOptions::default()
            .set_indexed()
            .set_stored()
            .set_fast();
        let mtime = builder.add_i64_field("mtime", indexed_i64);
        let indexed_at = builder.add_i64_field("indexed_at", STORED | FAST);

        let indexing = TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let content = builder.add_text_field(
            "content",
            TextOptions::default()
                .set_indexing_options(indexing.clone())
                .set_stored(),
        );
        let fields_json = builder.add_text_field("fields_json", STORED);
        let fields_text = builder.add_text_field(
            "fields",
            TextOptions::default().set_indexing_options(indexing),
        );

        let error_message = builder.add_text_field("error_message", STORED);
        let error_detail = builder.add_text_field("error_detail", STORED);
        let validation_report = builder.add_text_field("validation_report", STORED);

        let schema = builder.build();
        let record_schema = Self {
            path,
            file_name,
            dir,
            purge_dir,
            deleted,
            error,
            doc_type,
            id,
            valid,
            error_kind,
            mtime,
            indexed_at,
            content,
            fields_json,
            fields_text,
            error_message,
            error_detail,
            validation_report,
        };

        (schema, record_schema)
    }

    /// Look up a keyword field by name.
    pub fn keyword(&self, name: &str) -> BackendResult<Field> {
        let field = match name {
            fields::PATH => self.path,
            fields::FILE_NAME => self.file_name,
            fields::DIR => self.dir,
            fields::PURGE_DIR => self.purge_dir,
            fields::DELETED => self.deleted,
            fields::ERROR => self.error,
            fields::DOC_TYPE => self.doc_type,
            fields::ID => self.id,
            fields::VALID => self.valid,
            fields::ERROR_KIND => self.error_kind,
            other => return Err(BackendError::UnknownField(other.to_string())),
        };
        Ok(field)
    }

    /// Fields searched when a query names none.
    pub fn default_search_fields(&self) -> Vec<Field> {
        vec![self.content, self.fields_text]
    }

    pub fn to_document(&self, record: &IndexedRecord) -> BackendResult<Document> {
        let mut doc = Document::default();
        doc.add_text(self.path, record.path_key());
        doc.add_text(self.file_name, &record.file_name);
        doc.add_text(self.dir, path_key(&record.dir));
        if let Some(purge_dir) = &record.purge_dir {
            doc.add_text(self.purge_dir, path_key(purge_dir));
        }
        doc.add_text(self.deleted, flag(record.deleted));
        doc.add_text(self.error, flag(record.is_error()));
        doc.add_text(self.doc_type, &record.doc_type);
        if let Some(id) = &record.id {
            doc.add_text(self.id, id);
        }
        doc.add_i64(self.mtime, record.mtime_ms);
        doc.add_i64(self.indexed_at, record.indexed_at.timestamp_millis());
        doc.add_text(self.content, &record.content);

        let json = serde_json::to_string(&record.fields).map_err(|e| BackendError::CorruptRecord {
            path: record.path_key(),
            reason: e.to_string(),
        })?;
        doc.add_text(self.fields_json, json);
        for value in record.fields.values() {
            doc.add_text(self.fields_text, value);
        }

        if let Some(validation) = &record.validation {
            doc.add_text(self.valid, flag(validation.valid));
            if let Some(report) = &validation.report {
                doc.add_text(self.validation_report, report);
            }
        }
        if let Some(error) = &record.error {
            doc.add_text(self.error_kind, &error.kind);
            doc.add_text(self.error_message, &error.message);
            doc.add_text(self.error_detail, &error.detail);
        }
        Ok(doc)
    }

    pub fn to_record(&self, doc: &Document) -> BackendResult<IndexedRecord> {
        let path = text(doc, self.path).ok_or_else(|| BackendError::CorruptRecord {
            path: String::from("<unknown>"),
            reason: "missing path".to_string(),
        })?;
        let corrupt = |reason: String| BackendError::CorruptRecord {
            path: path.clone(),
            reason,
        };

        let fields: BTreeMap<String, String> = match text(doc, self.fields_json) {
            Some(json) => serde_json::from_str(&json).map_err(|e| corrupt(e.to_string()))?,
            None => BTreeMap::new(),
        };
        let indexed_at = integer(doc, self.indexed_at)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default();
        let validation = text(doc, self.valid).map(|valid| Validation {
            valid: valid == "true",
            report: text(doc, self.validation_report),
        });
        let error = text(doc, self.error_kind).map(|kind| ErrorDetails {
            kind,
            message: text(doc, self.error_message).unwrap_or_default(),
            detail: text(doc, self.error_detail).unwrap_or_default(),
        });

        Ok(IndexedRecord {
            file_name: text(doc, self.file_name).unwrap_or_default(),
            dir: PathBuf::from(text(doc, self.dir).unwrap_or_default()),
            purge_dir: text(doc, self.purge_dir).map(PathBuf::from),
            mtime_ms: integer(doc, self.mtime).ok_or_else(|| corrupt("missing mtime".into()))?,
            deleted: text(doc, self.deleted).as_deref() == Some("true"),
            doc_type: text(doc, self.doc_type).unwrap_or_default(),
            id: text(doc, self.id),
            content: text(doc, self.content).unwrap_or_default(),
            fields,
            indexed_at,
            validation,
            error,
            path: PathBuf::from(path),
        })
    }
}

fn text(doc: &Document, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|value| value.as_str().map(str::to_string))
}

fn integer(doc: &Document, field: Field) -> Option<i64> {
    doc.get_first(field).and_then(|value| value.as_i64())
}
