//! Tantivy-backed implementation of the index backend.
//!
//! The writer is created lazily and kept for the lifetime of the backend.
//! Views wrap a `Searcher`, which pins the segments it was opened on, so a
//! view stays consistent while later commits land.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::IndexRecordOption;
use tantivy::{
    DocAddress, DocSet, Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, Searcher,
    TERMINATED, TantivyDocument as Document, Term,
};

use super::backend::{IndexBackend, IndexView, SearchHit, Visitor};
use super::error::{BackendError, BackendResult};
use super::record::IndexedRecord;
use super::schema::RecordSchema;

/// Writer heap budget. Tantivy needs at least 15MB per indexing thread.
const WRITER_HEAP_SIZE: usize = 50_000_000;

pub struct TantivyBackend {
    index: Index,
    reader: IndexReader,
    schema: Arc<RecordSchema>,
    writer: Option<IndexWriter<Document>>,
    location: Option<PathBuf>,
}

impl std::fmt::Debug for TantivyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyBackend")
            .field("location", &self.location)
            .field("has_writer", &self.writer.is_some())
            .finish()
    }
}

impl TantivyBackend {
    /// Create or open an on-disk index.
    pub fn open(index_path: impl AsRef<Path>) -> BackendResult<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&index_path)?;

        let (schema, record_schema) = RecordSchema::build();
        let existing = index_path.join("meta.json").exists();
        let index = if existing {
            Index::open_in_dir(&index_path)?
        } else {
            let dir = MmapDirectory::open(&index_path)?;
            Index::create(dir, schema, IndexSettings::default())?
        };

        Self::with_index(index, record_schema, Some(index_path))
    }

    /// A throwaway index held in RAM.
    pub fn in_memory() -> BackendResult<Self> {
        let (schema, record_schema) = RecordSchema::build();
        Self::with_index(Index::create_in_ram(schema), record_schema, None)
    }

    fn with_index(
        index: Index,
        schema: RecordSchema,
        location: Option<PathBuf>,
    ) -> BackendResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            index,
            reader,
            schema: Arc::new(schema),
            writer: None,
            location,
        })
    }

    fn ensure_writer(&mut self) -> BackendResult<&mut IndexWriter<Document>> {
        if self.writer.is_none() {
            self.writer = Some(self.index.writer_with_num_threads(1, WRITER_HEAP_SIZE)?);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| BackendError::Transient("index writer unavailable".to_string()))
    }
}

impl IndexBackend for TantivyBackend {
    fn remove_by_field_value(&mut self, field: &str, values: &[String]) -> BackendResult<()> {
        let field = self.schema.keyword(field)?;
        let writer = self.ensure_writer()?;
        for value in values {
            writer.delete_term(Term::from_field_text(field, value));
        }
        Ok(())
    }

    fn add_document(&mut self, record: &IndexedRecord) -> BackendResult<()> {
        let doc = self.schema.to_document(record)?;
        self.ensure_writer()?.add_document(doc)?;
        Ok(())
    }

    fn commit(&mut self) -> BackendResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    fn rollback(&mut self) -> BackendResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.rollback()?;
        }
        Ok(())
    }

    fn compact(&mut self) -> BackendResult<()> {
        let segments = self.index.searchable_segment_ids()?;
        let writer = self.ensure_writer()?;
        if segments.len() > 1 {
            writer.merge(&segments).wait()?;
        }
        writer.garbage_collect_files().wait()?;
        self.reader.reload()?;
        Ok(())
    }

    fn open_view(&self) -> BackendResult<Arc<dyn IndexView>> {
        Ok(Arc::new(TantivyView {
            index: self.index.clone(),
            searcher: self.reader.searcher(),
            schema: Arc::clone(&self.schema),
        }))
    }
}

/// A pinned searcher over one index generation.
pub struct TantivyView {
    index: Index,
    searcher: Searcher,
    schema: Arc<RecordSchema>,
}

impl IndexView for TantivyView {
    fn search(&self, query: &str, limit: usize) -> BackendResult<Vec<SearchHit>> {
        let parser = QueryParser::for_index(&self.index, self.schema.default_search_fields());
        let parsed = parser
            .parse_query(query)
            .map_err(|e| BackendError::malformed(query, e))?;

        let top_docs = self
            .searcher
            .search(&parsed, &TopDocs::with_limit(limit.max(1)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: Document = self.searcher.doc(address)?;
            hits.push(SearchHit {
                score,
                record: self.schema.to_record(&doc)?,
            });
        }
        Ok(hits)
    }

    fn stream_by_field_value(
        &self,
        field: &str,
        value: &str,
        visitor: &mut Visitor<'_>,
    ) -> BackendResult<()> {
        let field = self.schema.keyword(field)?;
        let term = Term::from_field_text(field, value);

        for (ordinal, segment) in self.searcher.segment_readers().iter().enumerate() {
            let inverted = segment.inverted_index(field)?;
            let Some(mut postings) = inverted.read_postings(&term, IndexRecordOption::Basic)?
            else {
                continue;
            };
            let alive = segment.alive_bitset();

            let mut doc_id = postings.doc();
            while doc_id != TERMINATED {
                if alive.is_none_or(|bits| bits.is_alive(doc_id)) {
                    let doc: Document = self
                        .searcher
                        .doc(DocAddress::new(ordinal as u32, doc_id))?;
                    if let ControlFlow::Break(()) = visitor(self.schema.to_record(&doc)?)? {
                        return Ok(());
                    }
                }
                doc_id = postings.advance();
            }
        }
        Ok(())
    }

    fn all_terms_for_field(&self, field: &str) -> BackendResult<Vec<String>> {
        let field = self.schema.keyword(field)?;
        let mut terms = BTreeSet::new();

        for segment in self.searcher.segment_readers() {
            let inverted = segment.inverted_index(field)?;
            let mut stream = inverted.terms().stream()?;
            while stream.advance() {
                terms.insert(String::from_utf8_lossy(stream.key()).into_owned());
            }
        }
        Ok(terms.into_iter().collect())
    }

    fn document_count(&self) -> u64 {
        self.searcher.num_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::record::fields;
    use tempfile::TempDir;

    fn record(path: &str, dir: &str) -> IndexedRecord {
        let mut record = IndexedRecord::new(path, dir, 1_000);
        record.doc_type = "text".to_string();
        record.content = format!("content of {path}");
        record
    }

    fn collect(view: &dyn IndexView, field: &str, value: &str) -> Vec<IndexedRecord> {
        let mut found = Vec::new();
        view.stream_by_field_value(field, value, &mut |record| {
            found.push(record);
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        found
    }

    #[test]
    fn test_add_commit_and_stream() {
        let mut backend = TantivyBackend::in_memory().unwrap();
        backend.add_document(&record("/d/a.xml", "/d")).unwrap();
        backend.add_document(&record("/d/b.xml", "/d")).unwrap();
        backend.add_document(&record("/e/c.xml", "/e")).unwrap();
        backend.commit().unwrap();

        let view = backend.open_view().unwrap();
        assert_eq!(view.document_count(), 3);
        assert_eq!(collect(view.as_ref(), fields::PURGE_DIR, "/d").len(), 2);
        assert_eq!(
            view.all_terms_for_field(fields::PURGE_DIR).unwrap(),
            vec!["/d".to_string(), "/e".to_string()]
        );
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let mut backend = TantivyBackend::in_memory().unwrap();
        backend.add_document(&record("/d/a.xml", "/d")).unwrap();
        backend.commit().unwrap();
        let before = backend.open_view().unwrap();

        backend
            .remove_by_field_value(fields::PATH, &["/d/a.xml".to_string()])
            .unwrap();
        backend.commit().unwrap();
        let after = backend.open_view().unwrap();

        assert_eq!(collect(before.as_ref(), fields::PATH, "/d/a.xml").len(), 1);
        assert!(collect(after.as_ref(), fields::PATH, "/d/a.xml").is_empty());
    }

    #[test]
    fn test_stream_stops_on_break() {
        let mut backend = TantivyBackend::in_memory().unwrap();
        for name in ["a", "b", "c"] {
            backend
                .add_document(&record(&format!("/d/{name}.xml"), "/d"))
                .unwrap();
        }
        backend.commit().unwrap();

        let view = backend.open_view().unwrap();
        let mut seen = 0;
        view.stream_by_field_value(fields::DIR, "/d", &mut |_| {
            seen += 1;
            Ok(ControlFlow::Break(()))
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_rollback_discards_staged_changes() {
        let mut backend = TantivyBackend::in_memory().unwrap();
        backend.add_document(&record("/d/a.xml", "/d")).unwrap();
        backend.commit().unwrap();

        backend.add_document(&record("/d/b.xml", "/d")).unwrap();
        backend.rollback().unwrap();
        backend.commit().unwrap();

        assert_eq!(backend.open_view().unwrap().document_count(), 1);
    }

    #[test]
    fn test_search_and_malformed_query() {
        let mut backend = TantivyBackend::in_memory().unwrap();
        let mut rec = record("/d/a.xml", "/d");
        rec.content = "ocean temperature anomalies".to_string();
        backend.add_document(&rec).unwrap();
        backend.commit().unwrap();

        let view = backend.open_view().unwrap();
        let hits = view.search("temperature", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.path, rec.path);

        let err = view.search("nosuchfield:ocean", 10).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_reopen_and_compact_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut backend = TantivyBackend::open(temp_dir.path()).unwrap();
            backend.add_document(&record("/d/a.xml", "/d")).unwrap();
            backend.commit().unwrap();
            backend.add_document(&record("/d/b.xml", "/d")).unwrap();
            backend.commit().unwrap();
            backend.compact().unwrap();
            assert_eq!(backend.open_view().unwrap().document_count(), 2);
        }

        let backend = TantivyBackend::open(temp_dir.path()).unwrap();
        assert_eq!(backend.open_view().unwrap().document_count(), 2);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let backend = TantivyBackend::in_memory().unwrap();
        let view = backend.open_view().unwrap();
        assert!(matches!(
            view.all_terms_for_field("content"),
            Err(BackendError::UnknownField(_))
        ));
    }
}
