//! Record classifier.
//!
//! Decides, per parsed record, whether to skip, withdraw, merge as
//! duplicate, or queue for the conflict-aware upsert:
//!
//! - not released, no existing document: skip
//! - not released, existing document, replacement id: merge into it
//! - not released, existing document, no replacement: withdraw
//! - released: accumulate for the bulk upsert engine
//!
//! Withdraw and merge are written immediately (not batched); released
//! records are flushed in bulk for efficiency, with the external score
//! attached when known.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::audit;
use crate::models::{
    CatalogRecord, CurationMeta, ImportRecord, ParsedRecord, RecordStatus, SyncCounts,
};
use crate::store::{CatalogStore, RecordPatch};
use crate::upsert;

const IMPORTER: &str = "importer";

fn bumped_curation(existing: &CurationMeta, now: DateTime<Utc>) -> CurationMeta {
    CurationMeta {
        modified: existing.modified,
        modified_at: Some(now),
        modified_by: Some(IMPORTER.to_string()),
        edit_version: existing.edit_version + 1,
    }
}

/// Mark an existing record as withdrawn. No-op if it already is, so
/// reprocessing the same file set stays idempotent.
async fn withdraw_record(
    store: &dyn CatalogStore,
    existing: &CatalogRecord,
    now: DateTime<Utc>,
) -> Result<()> {
    if existing.record_status == RecordStatus::Withdrawn {
        return Ok(());
    }

    let patch = RecordPatch {
        record_status: Some(RecordStatus::Withdrawn),
        curation: Some(bumped_curation(&existing.curation, now)),
        ..Default::default()
    };
    store.update_record(&existing.id, &patch).await?;
    audit::emit(
        store,
        &existing.id,
        existing.record_type,
        "withdraw",
        IMPORTER,
        None,
        None,
    )
    .await;
    info!(record_id = existing.id, "withdrew record");
    Ok(())
}

/// Mark an existing record as a duplicate of its replacement. No-op if
/// it already points there.
async fn merge_record(
    store: &dyn CatalogStore,
    existing: &CatalogRecord,
    replacement_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    if existing.record_status == RecordStatus::Duplicate
        && existing.canonical_id.as_deref() == Some(replacement_id)
    {
        return Ok(());
    }

    let patch = RecordPatch {
        record_status: Some(RecordStatus::Duplicate),
        canonical_id: Some(Some(replacement_id.to_string())),
        curation: Some(bumped_curation(&existing.curation, now)),
        ..Default::default()
    };
    store.update_record(&existing.id, &patch).await?;
    audit::emit(
        store,
        &existing.id,
        existing.record_type,
        "merge",
        IMPORTER,
        Some(serde_json::json!({ "canonical_id": replacement_id })),
        None,
    )
    .await;
    info!(
        record_id = existing.id,
        canonical_id = replacement_id,
        "merged record into replacement"
    );
    Ok(())
}

/// Classify and process one batch of parsed records.
///
/// Per-record store failures are logged and counted as skipped; only
/// infrastructure-level errors propagate.
pub async fn process_parsed_records(
    store: &dyn CatalogStore,
    parsed: Vec<ParsedRecord>,
    scores: &HashMap<String, f64>,
    now: DateTime<Utc>,
) -> Result<SyncCounts> {
    let mut counts = SyncCounts::default();
    let mut to_upsert: Vec<ImportRecord> = Vec::new();

    for record in parsed {
        if !record.is_released {
            let existing = match store.get_record(&record.id).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!(record_id = record.id, error = %e, "lookup failed");
                    counts.skipped += 1;
                    continue;
                }
            };

            let Some(existing) = existing else {
                debug!(record_id = record.id, "skipping unreleased record not in catalog");
                counts.skipped += 1;
                continue;
            };

            let result = match &record.replacement_id {
                Some(replacement_id) => {
                    merge_record(store, &existing, replacement_id, now).await
                }
                None => withdraw_record(store, &existing, now).await,
            };
            match result {
                Ok(()) if record.replacement_id.is_some() => counts.merged += 1,
                Ok(()) => counts.withdrawn += 1,
                Err(e) => {
                    warn!(record_id = record.id, error = %e, "write failed");
                    counts.skipped += 1;
                }
            }
            continue;
        }

        to_upsert.push(ImportRecord {
            db_score: scores.get(&record.id).copied(),
            id: record.id,
            record_type: record.record_type,
            pref_label: record.pref_label,
            alt_labels: record.alt_labels,
            authors: record.authors,
        });
    }

    if !to_upsert.is_empty() {
        let bulk = upsert::bulk_upsert_from_import(store, to_upsert, now).await?;
        counts.upserted = bulk.created + bulk.updated;
        counts.skipped += bulk.skipped;
    }

    info!(
        upserted = counts.upserted,
        merged = counts.merged,
        withdrawn = counts.withdrawn,
        skipped = counts.skipped,
        "record processing complete"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordType;
    use crate::store::memory::MemoryStore;

    fn parsed(id: &str, released: bool, replacement: Option<&str>) -> ParsedRecord {
        ParsedRecord {
            id: id.to_string(),
            record_type: RecordType::from_id(id),
            is_released: released,
            replacement_id: replacement.map(|r| r.to_string()),
            pref_label: Some("ཆོས".to_string()),
            alt_labels: vec![],
            authors: vec![],
        }
    }

    async fn seed(store: &MemoryStore, id: &str) -> CatalogRecord {
        let now = Utc::now();
        upsert::bulk_upsert_from_import(
            store,
            vec![ImportRecord {
                id: id.to_string(),
                record_type: RecordType::from_id(id),
                pref_label: Some("seed".to_string()),
                alt_labels: vec![],
                authors: vec![],
                db_score: None,
            }],
            now,
        )
        .await
        .unwrap();
        store.get_record(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn unreleased_and_absent_is_a_silent_skip() {
        let store = MemoryStore::new();
        let counts = process_parsed_records(
            &store,
            vec![parsed("W000001", false, None)],
            &HashMap::new(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.upserted + counts.merged + counts.withdrawn, 0);
        assert!(store.get_record("W000001").await.unwrap().is_none());
        assert!(store.audit_events().is_empty());
    }

    #[tokio::test]
    async fn unreleased_with_replacement_merges_existing() {
        let store = MemoryStore::new();
        seed(&store, "W000002").await;

        let counts = process_parsed_records(
            &store,
            vec![parsed("W000002", false, Some("W000099"))],
            &HashMap::new(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(counts.merged, 1);
        let doc = store.get_record("W000002").await.unwrap().unwrap();
        assert_eq!(doc.record_status, RecordStatus::Duplicate);
        assert_eq!(doc.canonical_id.as_deref(), Some("W000099"));
        assert_eq!(doc.curation.edit_version, 1);
        assert_eq!(doc.curation.modified_by.as_deref(), Some("importer"));
        assert!(!doc.curation.modified);

        let merges: Vec<_> = store
            .audit_events()
            .into_iter()
            .filter(|e| e.action == "merge")
            .collect();
        assert_eq!(merges.len(), 1);
    }

    #[tokio::test]
    async fn unreleased_without_replacement_withdraws_existing() {
        let store = MemoryStore::new();
        seed(&store, "W000003").await;

        let counts = process_parsed_records(
            &store,
            vec![parsed("W000003", false, None)],
            &HashMap::new(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(counts.withdrawn, 1);
        let doc = store.get_record("W000003").await.unwrap().unwrap();
        assert_eq!(doc.record_status, RecordStatus::Withdrawn);
        assert_eq!(doc.curation.edit_version, 1);
    }

    #[tokio::test]
    async fn reprocessing_a_merge_does_not_bump_edit_version_again() {
        let store = MemoryStore::new();
        seed(&store, "W000002").await;

        let batch = vec![parsed("W000002", false, Some("W000099"))];
        process_parsed_records(&store, batch.clone(), &HashMap::new(), Utc::now())
            .await
            .unwrap();
        let first = store.get_record("W000002").await.unwrap().unwrap();

        let counts = process_parsed_records(&store, batch, &HashMap::new(), Utc::now())
            .await
            .unwrap();
        assert_eq!(counts.merged, 1);
        let second = store.get_record("W000002").await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn released_records_are_upserted_with_scores() {
        let store = MemoryStore::new();
        let mut scores = HashMap::new();
        scores.insert("W000010".to_string(), 4.2);

        let counts = process_parsed_records(
            &store,
            vec![parsed("W000010", true, None), parsed("W000011", true, None)],
            &scores,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(counts.upserted, 2);
        let scored = store.get_record("W000010").await.unwrap().unwrap();
        assert_eq!(scored.db_score, Some(4.2));
        let unscored = store.get_record("W000011").await.unwrap().unwrap();
        assert_eq!(unscored.db_score, None);
    }
}
