//! In-memory [`CatalogStore`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. The guarded
//! upsert holds the write lock across the read and the write, matching
//! the atomicity the SQLite backend gets from its transaction.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AuditEvent, CatalogRecord, RecordStatus, RecordType, SyncWatermark};

use super::{apply_guarded_upsert, CatalogStore, GuardedUpsert, RecordPatch, UpsertOutcome};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, CatalogRecord>>,
    watermarks: RwLock<HashMap<String, SyncWatermark>>,
    audit: RwLock<Vec<AuditEvent>>,
    /// When set, the next `fail_writes` guarded upserts error out.
    fail_writes: RwLock<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` guarded upserts fail, for error-path tests.
    pub fn fail_next_writes(&self, n: usize) {
        *self.fail_writes.write().unwrap() = n;
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.read().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>> {
        Ok(self.records.read().unwrap().get(id).cloned())
    }

    async fn index_record(&self, record: &CatalogRecord) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let existing = records
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("record '{}' not found", id))?;
        let updated = patch.apply_to(existing);
        records.insert(id.to_string(), updated);
        Ok(())
    }

    async fn bulk_guarded_upsert(&self, ops: &[GuardedUpsert]) -> Result<Vec<UpsertOutcome>> {
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            {
                let mut remaining = self.fail_writes.write().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    outcomes.push(UpsertOutcome::Error("injected write failure".to_string()));
                    continue;
                }
            }

            let mut records = self.records.write().unwrap();
            let (doc, outcome) = apply_guarded_upsert(records.get(&op.record.id), op);
            if outcome != UpsertOutcome::Noop {
                records.insert(doc.id.clone(), doc);
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn search_records(
        &self,
        record_type: RecordType,
        query: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CatalogRecord>> {
        let records = self.records.read().unwrap();
        let mut hits: Vec<CatalogRecord> = records
            .values()
            .filter(|r| r.record_type == record_type && r.record_status == RecordStatus::Active)
            .filter(|r| match query {
                Some(q) if !q.is_empty() => {
                    r.pref_label.as_deref().is_some_and(|l| l.contains(q))
                        || r.alt_labels.iter().any(|l| l.contains(q))
                        || r.authors.iter().any(|a| a.contains(q))
                }
                _ => true,
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn count_records(
        &self,
        record_type: RecordType,
        status: Option<RecordStatus>,
    ) -> Result<i64> {
        let records = self.records.read().unwrap();
        Ok(records
            .values()
            .filter(|r| r.record_type == record_type)
            .filter(|r| status.is_none_or(|s| r.record_status == s))
            .count() as i64)
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn load_watermark(&self, key: &str) -> Result<Option<SyncWatermark>> {
        Ok(self.watermarks.read().unwrap().get(key).cloned())
    }

    async fn store_watermark(&self, key: &str, watermark: &SyncWatermark) -> Result<()> {
        self.watermarks
            .write()
            .unwrap()
            .insert(key.to_string(), watermark.clone());
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.audit.write().unwrap().push(event.clone());
        Ok(())
    }

    async fn audit_history(&self, record_id: &str, limit: i64) -> Result<Vec<AuditEvent>> {
        let audit = self.audit.read().unwrap();
        Ok(audit
            .iter()
            .rev()
            .filter(|e| e.record_id == record_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
