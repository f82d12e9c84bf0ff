//! Storage abstraction for the catalog.
//!
//! The [`CatalogStore`] trait defines every document-store operation the
//! sync pipeline and curator services need, enabling pluggable backends
//! (SQLite, in-memory for tests).
//!
//! The conflict-aware merge itself lives in [`apply_guarded_upsert`], a
//! pure function shared by all backends so that every implementation
//! enforces the same "respect curator edits" contract. Backends must run
//! it atomically per document: a transaction (or lock) held across the
//! read and the write, serialized against concurrent writers.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AuditEvent, CatalogRecord, CurationMeta, ImportMeta, ImportRecord, ImportResult, Origin,
    RecordStatus, RecordType, SourceMeta, SyncWatermark,
};

/// One guarded-upsert operation for the bulk call.
#[derive(Debug, Clone)]
pub struct GuardedUpsert {
    pub record: ImportRecord,
    /// Shared run timestamp, stamped into `source_meta` and `import_meta`.
    pub now: DateTime<Utc>,
}

/// Per-item outcome of a bulk guarded upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The resulting document is identical to the stored one.
    Noop,
    /// Store-level failure for this item only; the batch continues.
    Error(String),
}

/// Partial update of an existing record. `None` fields are left untouched.
///
/// `canonical_id` and `pref_label` are doubly optional so a patch can
/// distinguish "leave as is" from "set to null".
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub record_status: Option<RecordStatus>,
    pub canonical_id: Option<Option<String>>,
    pub pref_label: Option<Option<String>>,
    pub alt_labels: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
    pub curation: Option<CurationMeta>,
}

impl RecordPatch {
    /// Apply this patch on top of an existing record.
    pub fn apply_to(&self, existing: &CatalogRecord) -> CatalogRecord {
        let mut updated = existing.clone();
        if let Some(status) = self.record_status {
            updated.record_status = status;
        }
        if let Some(canonical_id) = &self.canonical_id {
            updated.canonical_id = canonical_id.clone();
        }
        if let Some(pref_label) = &self.pref_label {
            updated.pref_label = pref_label.clone();
        }
        if let Some(alt_labels) = &self.alt_labels {
            updated.alt_labels = alt_labels.clone();
        }
        if let Some(authors) = &self.authors {
            updated.authors = authors.clone();
        }
        if let Some(curation) = &self.curation {
            updated.curation = curation.clone();
        }
        updated
    }

    /// JSON view of the changed fields, for audit diffs.
    pub fn to_diff(&self) -> serde_json::Value {
        let mut diff = serde_json::Map::new();
        if let Some(status) = self.record_status {
            diff.insert("record_status".into(), status.as_str().into());
        }
        if let Some(canonical_id) = &self.canonical_id {
            diff.insert("canonical_id".into(), serde_json::json!(canonical_id));
        }
        if let Some(pref_label) = &self.pref_label {
            diff.insert("pref_label".into(), serde_json::json!(pref_label));
        }
        if let Some(alt_labels) = &self.alt_labels {
            diff.insert("alt_labels".into(), serde_json::json!(alt_labels));
        }
        if let Some(authors) = &self.authors {
            diff.insert("authors".into(), serde_json::json!(authors));
        }
        serde_json::Value::Object(diff)
    }
}

/// Abstract document store for catalog records, watermarks, and audit
/// events.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_record`](CatalogStore::get_record) | Fetch one record by id |
/// | [`index_record`](CatalogStore::index_record) | Write a whole record, immediately visible |
/// | [`update_record`](CatalogStore::update_record) | Merge a partial update into a record |
/// | [`bulk_guarded_upsert`](CatalogStore::bulk_guarded_upsert) | Conflict-aware bulk import write |
/// | [`search_records`](CatalogStore::search_records) | Label search over active records of a type |
/// | [`count_records`](CatalogStore::count_records) | Count records by type and status |
/// | [`refresh`](CatalogStore::refresh) | Force write visibility |
/// | [`load_watermark`](CatalogStore::load_watermark) / [`store_watermark`](CatalogStore::store_watermark) | Sync watermark persistence |
/// | [`append_audit`](CatalogStore::append_audit) / [`audit_history`](CatalogStore::audit_history) | Audit trail |
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>>;

    async fn index_record(&self, record: &CatalogRecord) -> Result<()>;

    /// Merge a partial update into an existing record. Fails if the
    /// record does not exist.
    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<()>;

    /// Apply a batch of guarded upserts, one atomic conditional merge per
    /// document. Returns one outcome per input, in order; individual
    /// failures surface as [`UpsertOutcome::Error`] and never abort the
    /// batch.
    async fn bulk_guarded_upsert(&self, ops: &[GuardedUpsert]) -> Result<Vec<UpsertOutcome>>;

    /// Search active records of a type by label or author id. An empty
    /// query lists active records of the type.
    async fn search_records(
        &self,
        record_type: RecordType,
        query: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CatalogRecord>>;

    async fn count_records(
        &self,
        record_type: RecordType,
        status: Option<RecordStatus>,
    ) -> Result<i64>;

    /// Force pending writes to become visible to searches.
    async fn refresh(&self) -> Result<()>;

    async fn load_watermark(&self, key: &str) -> Result<Option<SyncWatermark>>;

    async fn store_watermark(&self, key: &str, watermark: &SyncWatermark) -> Result<()>;

    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    /// Audit history for one record, newest first.
    async fn audit_history(&self, record_id: &str, limit: i64) -> Result<Vec<AuditEvent>>;
}

/// Compute the result of one guarded upsert against the current document
/// state.
///
/// Absent document: create it fresh with `origin=imported`,
/// `record_status=active`, no canonical id, full content fields, and a
/// zeroed curation block.
///
/// Present document: always stamp `source_meta.updated_at` and
/// `import_meta.last_run_at`; overwrite content fields (each only when
/// the incoming value is non-null) and set
/// `last_result=updated_or_created` only while `curation.modified` is
/// false, otherwise leave content untouched and set
/// `last_result=skipped_modified`. `record_status`, `canonical_id`, and
/// `origin` are never touched on existing documents.
pub fn apply_guarded_upsert(
    existing: Option<&CatalogRecord>,
    op: &GuardedUpsert,
) -> (CatalogRecord, UpsertOutcome) {
    let record = &op.record;

    let Some(existing) = existing else {
        let created = CatalogRecord {
            id: record.id.clone(),
            record_type: record.record_type,
            origin: Origin::Imported,
            record_status: RecordStatus::Active,
            canonical_id: None,
            pref_label: record.pref_label.clone(),
            alt_labels: record.alt_labels.clone(),
            authors: record.authors.clone(),
            db_score: record.db_score,
            curation: CurationMeta::default(),
            source_meta: SourceMeta {
                updated_at: Some(op.now),
            },
            import_meta: ImportMeta {
                last_run_at: Some(op.now),
                last_result: Some(ImportResult::UpdatedOrCreated),
            },
        };
        return (created, UpsertOutcome::Created);
    };

    let mut updated = existing.clone();
    updated.source_meta.updated_at = Some(op.now);
    updated.import_meta.last_run_at = Some(op.now);

    if !existing.curation.modified {
        if record.pref_label.is_some() {
            updated.pref_label = record.pref_label.clone();
        }
        updated.alt_labels = record.alt_labels.clone();
        updated.authors = record.authors.clone();
        if record.db_score.is_some() {
            updated.db_score = record.db_score;
        }
        updated.import_meta.last_result = Some(ImportResult::UpdatedOrCreated);
    } else {
        updated.import_meta.last_result = Some(ImportResult::SkippedModified);
    }

    if &updated == existing {
        (updated, UpsertOutcome::Noop)
    } else {
        (updated, UpsertOutcome::Updated)
    }
}
