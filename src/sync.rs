//! Sync controller.
//!
//! Orchestrates one import run for one record type: refresh the git
//! mirror, decide full vs incremental based on the stored watermark,
//! parse the record files batch by batch through the classifier, and
//! advance the watermark only after the whole run succeeded.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::classify;
use crate::config::Config;
use crate::git::SourceMirror;
use crate::models::{RecordType, SyncCounts, SyncWatermark};
use crate::record;
use crate::store::CatalogStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Reimport everything, ignoring the watermark.
    pub force: bool,
    /// Cap the number of files processed this run. The watermark still
    /// advances, so this is for smoke-testing against a fresh store.
    pub limit: Option<usize>,
    /// Parse and classify but write nothing, not even the watermark.
    pub dry_run: bool,
}

/// Run one sync pass for `record_type`.
///
/// Mirror failures abort the run before any write. Per-file parse
/// failures are logged and counted as skipped.
pub async fn sync_repo(
    store: &dyn CatalogStore,
    config: &Config,
    record_type: RecordType,
    scores: &HashMap<String, f64>,
    opts: SyncOptions,
) -> Result<SyncCounts> {
    let Some(repo_name) = config.source.repo_for(record_type) else {
        bail!("no source repository configured for record type '{}'", record_type);
    };

    let mirror = SourceMirror::open(&config.source, repo_name)?;
    let head = mirror.head_revision()?;
    let watermark_key = record_type.watermark_key();
    let watermark = store.load_watermark(&watermark_key).await?;

    if !opts.force
        && watermark
            .as_ref()
            .is_some_and(|w| w.last_revision_imported == head)
    {
        info!(
            record_type = %record_type,
            revision = head,
            "already at head revision, nothing to import"
        );
        return Ok(SyncCounts::default());
    }

    let files = plan_files(&mirror, record_type, watermark.as_ref(), opts.force)?;
    if files.is_empty() {
        info!(record_type = %record_type, "no record files changed");
        if !opts.dry_run {
            advance_watermark(store, &watermark_key, &head).await?;
        }
        return Ok(SyncCounts::default());
    }

    let files: Vec<PathBuf> = match opts.limit {
        Some(limit) => files.into_iter().take(limit).collect(),
        None => files,
    };
    info!(
        record_type = %record_type,
        files = files.len(),
        revision = head,
        "starting import"
    );

    // One timestamp for the whole run so reruns over unchanged input
    // produce identical documents.
    let now = Utc::now();
    let mut counts = SyncCounts::default();

    for batch in files.chunks(config.source.batch_size) {
        let mut parsed = Vec::with_capacity(batch.len());
        for path in batch {
            match record::parse_record_file(path) {
                Ok(record) => parsed.push(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse record file");
                    counts.skipped += 1;
                }
            }
        }

        if opts.dry_run {
            info!(records = parsed.len(), "dry run, not writing batch");
            counts.skipped += parsed.len() as u64;
            continue;
        }

        counts += classify::process_parsed_records(store, parsed, scores, now).await?;
    }

    if !opts.dry_run {
        store.refresh().await?;
        advance_watermark(store, &watermark_key, &head).await?;
    }

    info!(
        record_type = %record_type,
        upserted = counts.upserted,
        merged = counts.merged,
        withdrawn = counts.withdrawn,
        skipped = counts.skipped,
        "sync complete"
    );
    Ok(counts)
}

/// Pick full or incremental file enumeration. Falls back to a full
/// import when the stored revision no longer resolves (forced pushes,
/// shallow re-clones).
fn plan_files(
    mirror: &SourceMirror,
    record_type: RecordType,
    watermark: Option<&SyncWatermark>,
    force: bool,
) -> Result<Vec<PathBuf>> {
    if force {
        info!(record_type = %record_type, "forced full import");
        return mirror.all_files();
    }
    match watermark {
        Some(w) if mirror.revision_exists(&w.last_revision_imported) => {
            info!(
                record_type = %record_type,
                since = w.last_revision_imported,
                "incremental import"
            );
            mirror.changed_files_since(&w.last_revision_imported)
        }
        Some(w) => {
            warn!(
                record_type = %record_type,
                revision = w.last_revision_imported,
                "watermark revision no longer exists, falling back to full import"
            );
            mirror.all_files()
        }
        None => {
            info!(record_type = %record_type, "no watermark, full import");
            mirror.all_files()
        }
    }
}

async fn advance_watermark(
    store: &dyn CatalogStore,
    key: &str,
    head: &str,
) -> Result<()> {
    store
        .store_watermark(
            key,
            &SyncWatermark {
                last_revision_imported: head.to_string(),
                last_updated_at: Utc::now(),
            },
        )
        .await
}
