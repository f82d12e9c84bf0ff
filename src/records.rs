//! Curator-facing record operations: create, update, merge, lookup,
//! and per-record audit history.
//!
//! Every mutation here flips `curation.modified` and bumps the edit
//! version, which is what shields the content fields from later import
//! overwrites. Validation failures surface as [`CatalogError`] so the
//! HTTP layer can map them to 404/409 without a partial write having
//! happened.

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;

use crate::audit;
use crate::error::CatalogError;
use crate::models::{
    generate_id, AuditEvent, CatalogRecord, CurationMeta, Origin, RecordStatus, RecordType,
};
use crate::store::{CatalogStore, RecordPatch};

const ID_SUFFIX_LEN: usize = 8;
const ID_ATTEMPTS: usize = 5;

/// Content fields accepted when creating a record.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordInput {
    pub pref_label: Option<String>,
    #[serde(default)]
    pub alt_labels: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// Partial update of content fields. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordUpdate {
    pub pref_label: Option<String>,
    pub alt_labels: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
}

impl RecordUpdate {
    fn is_empty(&self) -> bool {
        self.pref_label.is_none() && self.alt_labels.is_none() && self.authors.is_none()
    }
}

fn id_prefix(record_type: RecordType) -> Option<&'static str> {
    match record_type {
        RecordType::Work => Some("WA"),
        RecordType::Person => Some("P"),
        RecordType::Unknown => None,
    }
}

fn curator_bump(existing: &CurationMeta, actor: &str) -> CurationMeta {
    CurationMeta {
        modified: true,
        modified_at: Some(Utc::now()),
        modified_by: Some(actor.to_string()),
        edit_version: existing.edit_version + 1,
    }
}

/// Create a locally-authored record with a fresh type-prefixed id.
pub async fn create_record(
    store: &dyn CatalogStore,
    record_type: RecordType,
    input: RecordInput,
    actor: &str,
) -> Result<CatalogRecord> {
    let Some(prefix) = id_prefix(record_type) else {
        return Err(CatalogError::conflict("cannot create records of unknown type").into());
    };

    let mut id = generate_id(prefix, ID_SUFFIX_LEN);
    for _ in 0..ID_ATTEMPTS {
        if store.get_record(&id).await?.is_none() {
            break;
        }
        id = generate_id(prefix, ID_SUFFIX_LEN);
    }

    let record = CatalogRecord {
        id,
        record_type,
        origin: Origin::Local,
        record_status: RecordStatus::Active,
        canonical_id: None,
        pref_label: input.pref_label,
        alt_labels: input.alt_labels,
        authors: input.authors,
        db_score: None,
        curation: CurationMeta {
            modified: true,
            modified_at: Some(Utc::now()),
            modified_by: Some(actor.to_string()),
            edit_version: 1,
        },
        source_meta: Default::default(),
        import_meta: Default::default(),
    };
    store.index_record(&record).await?;
    audit::emit(store, &record.id, record_type, "create", actor, None, None).await;
    Ok(record)
}

/// Update content fields of an existing record.
pub async fn update_record(
    store: &dyn CatalogStore,
    id: &str,
    update: RecordUpdate,
    actor: &str,
) -> Result<CatalogRecord> {
    if update.is_empty() {
        return Err(CatalogError::conflict("no fields to update").into());
    }
    let existing = store
        .get_record(id)
        .await?
        .ok_or_else(|| CatalogError::not_found("record", id))?;

    let patch = RecordPatch {
        pref_label: update.pref_label.map(Some),
        alt_labels: update.alt_labels,
        authors: update.authors,
        curation: Some(curator_bump(&existing.curation, actor)),
        ..Default::default()
    };
    store.update_record(id, &patch).await?;
    audit::emit(
        store,
        id,
        existing.record_type,
        "edit",
        actor,
        Some(patch.to_diff()),
        None,
    )
    .await;
    Ok(patch.apply_to(&existing))
}

/// Merge `id` into `canonical_id` as a curator decision.
///
/// All validation happens before any write: merging a record into
/// itself, re-merging an already merged record, or crossing record
/// types is rejected with the store untouched.
pub async fn merge_records(
    store: &dyn CatalogStore,
    id: &str,
    canonical_id: &str,
    actor: &str,
) -> Result<CatalogRecord> {
    if id == canonical_id {
        return Err(CatalogError::conflict("cannot merge a record into itself").into());
    }
    let existing = store
        .get_record(id)
        .await?
        .ok_or_else(|| CatalogError::not_found("record", id))?;
    if existing.record_status == RecordStatus::Duplicate {
        return Err(CatalogError::conflict(format!(
            "record '{}' is already merged into '{}'",
            id,
            existing.canonical_id.as_deref().unwrap_or("?")
        ))
        .into());
    }
    let canonical = store
        .get_record(canonical_id)
        .await?
        .ok_or_else(|| CatalogError::not_found("canonical record", canonical_id))?;
    if canonical.record_type != existing.record_type {
        return Err(CatalogError::conflict(format!(
            "cannot merge {} '{}' into {} '{}'",
            existing.record_type, id, canonical.record_type, canonical_id
        ))
        .into());
    }

    let patch = RecordPatch {
        record_status: Some(RecordStatus::Duplicate),
        canonical_id: Some(Some(canonical_id.to_string())),
        curation: Some(curator_bump(&existing.curation, actor)),
        ..Default::default()
    };
    store.update_record(id, &patch).await?;
    audit::emit(
        store,
        id,
        existing.record_type,
        "merge",
        actor,
        Some(serde_json::json!({ "canonical_id": canonical_id })),
        None,
    )
    .await;
    Ok(patch.apply_to(&existing))
}

/// Fetch a record or fail with a not-found error.
pub async fn get_record(store: &dyn CatalogStore, id: &str) -> Result<CatalogRecord> {
    store
        .get_record(id)
        .await?
        .ok_or_else(|| CatalogError::not_found("record", id).into())
}

/// Audit trail of one record, newest first.
pub async fn record_history(
    store: &dyn CatalogStore,
    id: &str,
    limit: i64,
) -> Result<Vec<AuditEvent>> {
    if store.get_record(id).await?.is_none() {
        return Err(CatalogError::not_found("record", id).into());
    }
    store.audit_history(id, limit).await
}
