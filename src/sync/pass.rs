//! Per-invocation bookkeeping: counters, touched paths and the bounded
//! batch of staged changes.

use std::collections::HashSet;

use crate::index::record::fields;
use crate::index::{Batch, BackendResult, IndexGateway, IndexedRecord};
use crate::writer::SessionAttributes;

pub(crate) struct SyncPass<'g> {
    gateway: &'g IndexGateway,
    batch: Batch,
    max_batch: usize,
    touched: HashSet<String>,
    session: SessionAttributes,
    pub added: usize,
    pub removed: usize,
    pub replaced: usize,
    pub item_errors: usize,
    pub flushes: usize,
}

impl<'g> SyncPass<'g> {
    pub fn new(gateway: &'g IndexGateway, max_batch: usize) -> Self {
        Self {
            gateway,
            batch: Batch::new(),
            max_batch: max_batch.max(1),
            touched: HashSet::new(),
            session: SessionAttributes::new(),
            added: 0,
            removed: 0,
            replaced: 0,
            item_errors: 0,
            flushes: 0,
        }
    }

    pub fn gateway(&self) -> &'g IndexGateway {
        self.gateway
    }

    /// Mark a path as seen. Returns `false` if it already was.
    pub fn touch(&mut self, path_key: String) -> bool {
        self.touched.insert(path_key)
    }

    pub fn was_touched(&self, path_key: &str) -> bool {
        self.touched.contains(path_key)
    }

    pub fn session_mut(&mut self) -> &mut SessionAttributes {
        &mut self.session
    }

    pub fn stage_add(&mut self, record: IndexedRecord) {
        self.batch.add(record);
    }

    /// Replace whatever is indexed under the record's path.
    pub fn stage_replace(&mut self, record: IndexedRecord) {
        self.batch.remove(fields::PATH, record.path_key());
        self.batch.add(record);
    }

    pub fn stage_remove(&mut self, field: &str, value: impl Into<String>) {
        self.batch.remove(field, value);
    }

    /// Commit once the batch reached its bound.
    pub fn flush_if_full(&mut self) -> BackendResult<()> {
        if self.batch.additions().len() >= self.max_batch
            || self.batch.removal_count() >= self.max_batch
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit everything staged and start a fresh writer session.
    pub fn flush(&mut self) -> BackendResult<()> {
        if !self.batch.is_empty() {
            self.gateway.commit_batch(&self.batch)?;
            self.flushes += 1;
            self.batch.clear();
        }
        self.session.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> IndexedRecord {
        IndexedRecord::new(path, "/d", 1)
    }

    #[test]
    fn test_flushes_at_batch_bound() {
        let gateway = IndexGateway::in_memory().unwrap();
        let mut pass = SyncPass::new(&gateway, 2);

        pass.stage_add(record("/d/a.xml"));
        pass.flush_if_full().unwrap();
        assert_eq!(gateway.current_version(), 0);

        pass.stage_add(record("/d/b.xml"));
        pass.flush_if_full().unwrap();
        assert_eq!(gateway.current_version(), 1);
        assert_eq!(gateway.document_count(), 2);
    }

    #[test]
    fn test_flush_clears_session() {
        let gateway = IndexGateway::in_memory().unwrap();
        let mut pass = SyncPass::new(&gateway, 10);
        pass.session_mut()
            .insert("schema".to_string(), "cached".to_string());

        pass.flush().unwrap();
        assert!(pass.session_mut().is_empty());
        assert_eq!(pass.flushes, 0, "nothing staged, nothing committed");
    }

    #[test]
    fn test_stage_replace_swaps_record() {
        let gateway = IndexGateway::in_memory().unwrap();
        let mut pass = SyncPass::new(&gateway, 10);
        pass.stage_add(record("/d/a.xml"));
        pass.flush().unwrap();

        let mut newer = record("/d/a.xml");
        newer.mtime_ms = 99;
        pass.stage_replace(newer);
        pass.flush().unwrap();

        let found = gateway.find_by_field(fields::PATH, "/d/a.xml").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mtime_ms, 99);
    }

    #[test]
    fn test_touch_is_idempotent() {
        let gateway = IndexGateway::in_memory().unwrap();
        let mut pass = SyncPass::new(&gateway, 10);
        assert!(pass.touch("/d/a.xml".to_string()));
        assert!(!pass.touch("/d/a.xml".to_string()));
        assert!(pass.was_touched("/d/a.xml"));
    }
}
