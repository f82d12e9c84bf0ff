//! End-to-end sync behavior against a local git source repository,
//! using the in-memory store to inspect documents and watermarks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use shelfmark::config::{Config, DbConfig, ScoresConfig, ServerConfig, SourceConfig};
use shelfmark::models::{ImportResult, RecordType};
use shelfmark::records::{self, RecordUpdate};
use shelfmark::store::memory::MemoryStore;
use shelfmark::store::CatalogStore;
use shelfmark::sync::{sync_repo, SyncOptions};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run git {:?}: {}", args, e));
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn released_record(id: &str, label: &str) -> String {
    format!(
        r#"@prefix adm: <http://purl.bdrc.io/ontology/admin/> .
@prefix bda: <http://purl.bdrc.io/admindata/> .
@prefix bdr: <http://purl.bdrc.io/resource/> .
@prefix skos: <http://www.w3.org/2004/02/skos/core#> .

bda:{id} adm:status bda:StatusReleased .
bdr:{id} skos:prefLabel "{label}"@bo .
"#
    )
}

struct TestSource {
    _tmp: TempDir,
    repo: PathBuf,
    config: Config,
}

fn setup_source(records: &[(&str, String)]) -> TestSource {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let repo = root.join("remote").join("works.git");
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init"]);
    for (id, content) in records {
        fs::write(repo.join(format!("{}.trig", id)), content).unwrap();
    }
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "initial records"]);

    let config = Config {
        db: DbConfig {
            path: root.join("data/shelfmark.db"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:8787".to_string(),
        },
        source: SourceConfig {
            base_url: root.join("remote").display().to_string(),
            data_dir: root.join("data/mirrors"),
            work_repo: "works".to_string(),
            person_repo: "persons".to_string(),
            batch_size: 5000,
            include_globs: vec!["**/*.trig".to_string()],
        },
        scores: ScoresConfig::default(),
    };

    TestSource {
        _tmp: tmp,
        repo,
        config,
    }
}

fn commit_record(repo: &Path, id: &str, content: &str) {
    fs::write(repo.join(format!("{}.trig", id)), content).unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-m", "update record"]);
}

#[tokio::test]
async fn full_import_then_incremental_only_touches_changed_files() {
    let src = setup_source(&[
        ("W100", released_record("W100", "ཆོས")),
        ("W200", released_record("W200", "མཛོད")),
    ]);
    let store = MemoryStore::new();
    let no_scores = HashMap::new();

    let counts = sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(counts.upserted, 2);

    let watermark = store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .expect("watermark written after full import");

    commit_record(&src.repo, "W100", &released_record("W100", "ཆོས་གསར"));

    let counts = sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(counts.upserted, 1);

    let updated = store.get_record("W100").await.unwrap().unwrap();
    assert_eq!(updated.pref_label.as_deref(), Some("ཆོས་གསར"));
    let untouched = store.get_record("W200").await.unwrap().unwrap();
    assert_eq!(untouched.pref_label.as_deref(), Some("མཛོད"));

    let advanced = store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(
        advanced.last_revision_imported,
        watermark.last_revision_imported
    );
}

#[tokio::test]
async fn sync_at_head_revision_does_nothing() {
    let src = setup_source(&[("W100", released_record("W100", "ཆོས"))]);
    let store = MemoryStore::new();
    let no_scores = HashMap::new();

    sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();
    let before = store.get_record("W100").await.unwrap().unwrap();

    let counts = sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(counts, Default::default());
    let after = store.get_record("W100").await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn unresolvable_watermark_revision_forces_a_full_import() {
    let src = setup_source(&[
        ("W100", released_record("W100", "ཆོས")),
        ("W200", released_record("W200", "མཛོད")),
    ]);
    let store = MemoryStore::new();
    let no_scores = HashMap::new();

    // A watermark pointing at a revision the mirror has never seen,
    // as after a forced push upstream.
    store
        .store_watermark(
            "work_import_record",
            &shelfmark::models::SyncWatermark {
                last_revision_imported: "0000000000000000000000000000000000000000".to_string(),
                last_updated_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    let counts = sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(counts.upserted, 2);
}

#[tokio::test]
async fn curated_content_survives_a_reimport() {
    let src = setup_source(&[("W100", released_record("W100", "ཆོས"))]);
    let store = MemoryStore::new();
    let no_scores = HashMap::new();

    sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();

    records::update_record(
        &store,
        "W100",
        RecordUpdate {
            pref_label: Some("curated title".to_string()),
            ..Default::default()
        },
        "alice",
    )
    .await
    .unwrap();

    commit_record(&src.repo, "W100", &released_record("W100", "upstream title"));
    sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();

    let record = store.get_record("W100").await.unwrap().unwrap();
    assert_eq!(record.pref_label.as_deref(), Some("curated title"));
    assert!(record.curation.modified);
    assert_eq!(
        record.import_meta.last_result,
        Some(ImportResult::SkippedModified)
    );
    assert!(record.source_meta.updated_at.is_some());
}

#[tokio::test]
async fn parse_failures_are_skipped_and_the_run_still_completes() {
    let src = setup_source(&[
        ("W100", released_record("W100", "ཆོས")),
        ("W999", "this is not trig {{{".to_string()),
    ]);
    let store = MemoryStore::new();
    let no_scores = HashMap::new();

    let counts = sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(counts.upserted, 1);
    assert_eq!(counts.skipped, 1);
    assert!(store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn limit_caps_files_but_still_advances_the_watermark() {
    let src = setup_source(&[
        ("W100", released_record("W100", "ཆོས")),
        ("W200", released_record("W200", "མཛོད")),
        ("W300", released_record("W300", "རྒྱུད")),
    ]);
    let store = MemoryStore::new();
    let no_scores = HashMap::new();

    let counts = sync_repo(
        &store,
        &src.config,
        RecordType::Work,
        &no_scores,
        SyncOptions {
            limit: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(counts.upserted, 2);
    assert!(store
        .load_watermark("work_import_record")
        .await
        .unwrap()
        .is_some());
}
