//! Contract between the gateway and a concrete search/storage engine.

use std::ops::ControlFlow;
use std::sync::Arc;

use super::error::BackendResult;
use super::record::IndexedRecord;

/// Callback used when streaming records.
///
/// Return `ControlFlow::Break(())` to stop early; an error aborts the stream
/// and is returned to the caller.
pub type Visitor<'a> = dyn FnMut(IndexedRecord) -> BackendResult<ControlFlow<()>> + 'a;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub record: IndexedRecord,
}

/// A consistent, immutable snapshot of the index.
pub trait IndexView: Send + Sync {
    fn search(&self, query: &str, limit: usize) -> BackendResult<Vec<SearchHit>>;

    /// Visit every live document whose keyword `field` equals `value`.
    fn stream_by_field_value(
        &self,
        field: &str,
        value: &str,
        visitor: &mut Visitor<'_>,
    ) -> BackendResult<()>;

    /// Distinct terms of a keyword field.
    fn all_terms_for_field(&self, field: &str) -> BackendResult<Vec<String>>;

    fn document_count(&self) -> u64;
}

/// Mutable side of an index. Callers serialize access.
pub trait IndexBackend: Send {
    fn remove_by_field_value(&mut self, field: &str, values: &[String]) -> BackendResult<()>;

    fn add_document(&mut self, record: &IndexedRecord) -> BackendResult<()>;

    /// Make staged changes durable and visible to new views.
    fn commit(&mut self) -> BackendResult<()>;

    /// Drop staged changes since the last commit.
    fn rollback(&mut self) -> BackendResult<()>;

    fn compact(&mut self) -> BackendResult<()>;

    fn open_view(&self) -> BackendResult<Arc<dyn IndexView>>;
}
