//! SQLite store behavior: persistence round-trips, the transactional
//! guarded upsert, watermarks, and the audit trail.

use chrono::Utc;
use tempfile::TempDir;

use shelfmark::config::{Config, DbConfig, ScoresConfig, ServerConfig, SourceConfig};
use shelfmark::models::{
    CatalogRecord, CurationMeta, ImportRecord, ImportResult, Origin, RecordStatus, RecordType,
    SyncWatermark,
};
use shelfmark::store::sqlite::SqliteStore;
use shelfmark::store::{CatalogStore, GuardedUpsert, RecordPatch, UpsertOutcome};
use shelfmark::{db, migrate};

async fn setup_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: tmp.path().join("shelfmark.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:8787".to_string(),
        },
        source: SourceConfig {
            base_url: "https://example.org".to_string(),
            data_dir: tmp.path().join("mirrors"),
            work_repo: "works".to_string(),
            person_repo: "persons".to_string(),
            batch_size: 5000,
            include_globs: vec!["**/*.trig".to_string()],
        },
        scores: ScoresConfig::default(),
    };
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn sample_record(id: &str) -> CatalogRecord {
    CatalogRecord {
        id: id.to_string(),
        record_type: RecordType::from_id(id),
        origin: Origin::Imported,
        record_status: RecordStatus::Active,
        canonical_id: None,
        pref_label: Some("ཆོས".to_string()),
        alt_labels: vec!["གཞན".to_string()],
        authors: vec!["P111".to_string()],
        db_score: Some(3.5),
        curation: CurationMeta::default(),
        source_meta: Default::default(),
        import_meta: Default::default(),
    }
}

fn import(id: &str, label: &str) -> ImportRecord {
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
async fn records_round_trip_through_sqlite() {
    let (_tmp, store) = setup_store().await;

    let record = sample_record("W100");
    store.index_record(&record).await.unwrap();

    let loaded = store.get_record("W100").await.unwrap().unwrap();
    assert_eq!(loaded, record);
    assert!(store.get_record("W404").await.unwrap().is_none());
}

#[tokio::test]
async fn guarded_upsert_creates_then_guards_curated_content() {
    let (_tmp, store) = setup_store().await;
    let now = Utc::now();

    let outcomes = store
        .bulk_guarded_upsert(&[GuardedUpsert {
            record: import("W100", "upstream"),
            now,
        }])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![UpsertOutcome::Created]);

    // A curator takes over the label.
    let existing = store.get_record("W100").await.unwrap().unwrap();
    let patch = RecordPatch {
        pref_label: Some(Some("curated".to_string())),
        curation: Some(CurationMeta {
            modified: true,
            modified_at: Some(Utc::now()),
            modified_by: Some("alice".to_string()),
            edit_version: existing.curation.edit_version + 1,
        }),
        ..Default::default()
    };
    store.update_record("W100", &patch).await.unwrap();

    let later = now + chrono::Duration::seconds(60);
    let outcomes = store
        .bulk_guarded_upsert(&[GuardedUpsert {
            record: import("W100", "upstream again"),
            now: later,
        }])
        .await
        .unwrap();
    assert_eq!(outcomes, vec![UpsertOutcome::Updated]);

    let record = store.get_record("W100").await.unwrap().unwrap();
    assert_eq!(record.pref_label.as_deref(), Some("curated"));
    assert_eq!(
        record.import_meta.last_result,
        Some(ImportResult::SkippedModified)
    );
    assert_eq!(record.source_meta.updated_at, Some(later));
}

#[tokio::test]
async fn rerun_with_identical_input_is_a_noop() {
    let (_tmp, store) = setup_store().await;
    let now = Utc::now();

    let ops = vec![GuardedUpsert {
        record: import("W100", "upstream"),
        now,
    }];
    store.bulk_guarded_upsert(&ops).await.unwrap();
    let outcomes = store.bulk_guarded_upsert(&ops).await.unwrap();
    assert_eq!(outcomes, vec![UpsertOutcome::Noop]);
}

#[tokio::test]
async fn update_of_missing_record_fails() {
    let (_tmp, store) = setup_store().await;
    let patch = RecordPatch {
        record_status: Some(RecordStatus::Withdrawn),
        ..Default::default()
    };
    assert!(store.update_record("W404", &patch).await.is_err());
}

#[tokio::test]
async fn search_matches_labels_and_authors_of_active_records() {
    let (_tmp, store) = setup_store().await;

    store.index_record(&sample_record("W100")).await.unwrap();
    let mut withdrawn = sample_record("W200");
    withdrawn.record_status = RecordStatus::Withdrawn;
    store.index_record(&withdrawn).await.unwrap();

    let by_label = store
        .search_records(RecordType::Work, Some("ཆོས"), 10)
        .await
        .unwrap();
    assert_eq!(by_label.len(), 1);
    assert_eq!(by_label[0].id, "W100");

    let by_author = store
        .search_records(RecordType::Work, Some("P111"), 10)
        .await
        .unwrap();
    assert_eq!(by_author.len(), 1);

    // Empty query lists active records only.
    let all_active = store
        .search_records(RecordType::Work, None, 10)
        .await
        .unwrap();
    assert_eq!(all_active.len(), 1);

    assert_eq!(
        store
            .count_records(RecordType::Work, Some(RecordStatus::Withdrawn))
            .await
            .unwrap(),
        1
    );
    assert_eq!(store.count_records(RecordType::Work, None).await.unwrap(), 2);
}

#[tokio::test]
async fn watermarks_round_trip() {
    let (_tmp, store) = setup_store().await;

    assert!(store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .is_none());

    let watermark = SyncWatermark {
        last_revision_imported: "abc123".to_string(),
        last_updated_at: Utc::now(),
    };
    store
        .store_watermark("work_import_record", &watermark)
        .await
        .unwrap();

    let loaded = store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.last_revision_imported, "abc123");

    // Overwrite on the same key.
    store
        .store_watermark(
            "work_import_record",
            &SyncWatermark {
                last_revision_imported: "def456".to_string(),
                last_updated_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    let loaded = store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.last_revision_imported, "def456");
}

#[tokio::test]
async fn audit_history_is_newest_first_and_per_record() {
    let (_tmp, store) = setup_store().await;

    for (record_id, action) in [("W100", "create"), ("W100", "edit"), ("W200", "create")] {
        store
            .append_audit(&shelfmark::models::AuditEvent {
                timestamp: Utc::now(),
                actor: "alice".to_string(),
                record_type: RecordType::Work,
                record_id: record_id.to_string(),
                action: action.to_string(),
                diff: None,
                correlation_id: None,
            })
            .await
            .unwrap();
    }

    let history = store.audit_history("W100", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, "edit");
    assert_eq!(history[1].action, "create");
}
