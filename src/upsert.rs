//! Conflict-aware bulk upsert engine.
//!
//! Takes the released records accumulated by the classifier and flushes
//! them through the store's guarded bulk upsert: one atomic conditional
//! merge per document, so curator edits are never overwritten by a
//! racing import. Every created or updated record emits an audit event
//! sharing one correlation id for the whole run.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::audit;
use crate::models::ImportRecord;
use crate::store::{CatalogStore, GuardedUpsert, UpsertOutcome};

/// Store-reported outcome counts for one bulk flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
}

/// Bulk upsert a batch of released records.
///
/// Per-record store errors are logged and counted as skipped; they never
/// abort the batch.
pub async fn bulk_upsert_from_import(
    store: &dyn CatalogStore,
    records: Vec<ImportRecord>,
    now: DateTime<Utc>,
) -> Result<UpsertCounts> {
    if records.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let correlation_id = format!("import-{}", now.to_rfc3339());

    let ops: Vec<GuardedUpsert> = records
        .into_iter()
        .map(|record| GuardedUpsert { record, now })
        .collect();

    let outcomes = store.bulk_guarded_upsert(&ops).await?;

    let mut counts = UpsertCounts::default();
    for (op, outcome) in ops.iter().zip(outcomes.iter()) {
        match outcome {
            UpsertOutcome::Created => {
                counts.created += 1;
                audit::emit(
                    store,
                    &op.record.id,
                    op.record.record_type,
                    "import_create",
                    "importer",
                    None,
                    Some(correlation_id.clone()),
                )
                .await;
            }
            UpsertOutcome::Updated => {
                counts.updated += 1;
                audit::emit(
                    store,
                    &op.record.id,
                    op.record.record_type,
                    "import_update",
                    "importer",
                    None,
                    Some(correlation_id.clone()),
                )
                .await;
            }
            UpsertOutcome::Noop => {
                counts.skipped += 1;
            }
            UpsertOutcome::Error(e) => {
                error!(record_id = op.record.id, error = %e, "bulk upsert error");
                counts.skipped += 1;
            }
        }
    }

    info!(
        created = counts.created,
        updated = counts.updated,
        skipped = counts.skipped,
        "bulk upsert complete"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportResult, Origin, RecordStatus, RecordType};
    use crate::store::memory::MemoryStore;

    fn record(id: &str, label: &str) -> ImportRecord {
        ImportRecord {
            id: id.to_string(),
            record_type: RecordType::from_id(id),
            pref_label: Some(label.to_string()),
            alt_labels: vec![],
            authors: vec![],
            db_score: None,
        }
    }

    #[tokio::test]
    async fn creates_fresh_documents_and_audits_them() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let counts =
            bulk_upsert_from_import(&store, vec![record("W1", "a"), record("W2", "b")], now)
                .await
                .unwrap();

        assert_eq!(counts.created, 2);
        assert_eq!(counts.updated, 0);

        let doc = store.get_record("W1").await.unwrap().unwrap();
        assert_eq!(doc.origin, Origin::Imported);
        assert_eq!(doc.record_status, RecordStatus::Active);

        let events = store.audit_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.action == "import_create"));
        let correlation = events[0].correlation_id.clone();
        assert!(correlation.is_some());
        assert_eq!(events[1].correlation_id, correlation);
    }

    #[tokio::test]
    async fn rerun_with_same_timestamp_is_all_noops() {
        let store = MemoryStore::new();
        let now = Utc::now();

        bulk_upsert_from_import(&store, vec![record("W1", "a")], now)
            .await
            .unwrap();
        let before = store.get_record("W1").await.unwrap().unwrap();

        let counts = bulk_upsert_from_import(&store, vec![record("W1", "a")], now)
            .await
            .unwrap();
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.created + counts.updated, 0);

        let after = store.get_record("W1").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn curated_document_content_survives_reimport() {
        let store = MemoryStore::new();
        let now = Utc::now();

        bulk_upsert_from_import(&store, vec![record("W1", "imported label")], now)
            .await
            .unwrap();

        let mut doc = store.get_record("W1").await.unwrap().unwrap();
        doc.curation.modified = true;
        doc.pref_label = Some("curated label".to_string());
        store.index_record(&doc).await.unwrap();

        let later = now + chrono::Duration::seconds(60);
        let counts = bulk_upsert_from_import(&store, vec![record("W1", "newer import")], later)
            .await
            .unwrap();
        assert_eq!(counts.updated, 1);

        let after = store.get_record("W1").await.unwrap().unwrap();
        assert_eq!(after.pref_label.as_deref(), Some("curated label"));
        assert_eq!(after.source_meta.updated_at, Some(later));
        assert_eq!(after.import_meta.last_run_at, Some(later));
        assert_eq!(
            after.import_meta.last_result,
            Some(ImportResult::SkippedModified)
        );
    }

    #[tokio::test]
    async fn store_errors_count_as_skipped_without_aborting() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        let now = Utc::now();

        let counts =
            bulk_upsert_from_import(&store, vec![record("W1", "a"), record("W2", "b")], now)
                .await
                .unwrap();

        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.created, 1);
        assert!(store.get_record("W1").await.unwrap().is_none());
        assert!(store.get_record("W2").await.unwrap().is_some());
    }
}
