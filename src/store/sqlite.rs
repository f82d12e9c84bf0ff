//! SQLite-backed [`CatalogStore`] implementation.
//!
//! Records are stored columnar for searchability, with the nested
//! curation/source/import metadata blocks as JSON columns. The guarded
//! upsert runs per document inside a transaction, so the read of
//! `curation.modified` and the conditional write commit atomically;
//! SQLite serializes writers, which gives the same lost-update protection
//! as a store-side scripted update.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::models::{
    AuditEvent, CatalogRecord, RecordStatus, RecordType, SyncWatermark,
};

use super::{apply_guarded_upsert, CatalogStore, GuardedUpsert, RecordPatch, UpsertOutcome};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_record(row: &SqliteRow) -> Result<CatalogRecord> {
    Ok(CatalogRecord {
        id: row.try_get("id")?,
        record_type: row.try_get::<String, _>("type")?.parse()?,
        origin: row.try_get::<String, _>("origin")?.parse()?,
        record_status: row.try_get::<String, _>("record_status")?.parse()?,
        canonical_id: row.try_get("canonical_id")?,
        pref_label: row.try_get("pref_label")?,
        alt_labels: serde_json::from_str(&row.try_get::<String, _>("alt_labels")?)?,
        authors: serde_json::from_str(&row.try_get::<String, _>("authors")?)?,
        db_score: row.try_get("db_score")?,
        curation: serde_json::from_str(&row.try_get::<String, _>("curation")?)?,
        source_meta: serde_json::from_str(&row.try_get::<String, _>("source_meta")?)?,
        import_meta: serde_json::from_str(&row.try_get::<String, _>("import_meta")?)?,
    })
}

async fn write_record<'e, E>(executor: E, record: &CatalogRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO records (id, type, origin, record_status, canonical_id,
                             pref_label, alt_labels, authors, db_score,
                             curation, source_meta, import_meta)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            type = excluded.type,
            origin = excluded.origin,
            record_status = excluded.record_status,
            canonical_id = excluded.canonical_id,
            pref_label = excluded.pref_label,
            alt_labels = excluded.alt_labels,
            authors = excluded.authors,
            db_score = excluded.db_score,
            curation = excluded.curation,
            source_meta = excluded.source_meta,
            import_meta = excluded.import_meta
        "#,
    )
    .bind(&record.id)
    .bind(record.record_type.as_str())
    .bind(record.origin.as_str())
    .bind(record.record_status.as_str())
    .bind(&record.canonical_id)
    .bind(&record.pref_label)
    .bind(serde_json::to_string(&record.alt_labels)?)
    .bind(serde_json::to_string(&record.authors)?)
    .bind(record.db_score)
    .bind(serde_json::to_string(&record.curation)?)
    .bind(serde_json::to_string(&record.source_meta)?)
    .bind(serde_json::to_string(&record.import_meta)?)
    .execute(executor)
    .await?;
    Ok(())
}

impl SqliteStore {
    /// One guarded upsert: read, merge, write, all in one transaction.
    async fn guarded_upsert_one(&self, op: &GuardedUpsert) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT * FROM records WHERE id = ?")
            .bind(&op.record.id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row_to_record(&row))
            .transpose()?;

        let (doc, outcome) = apply_guarded_upsert(existing.as_ref(), op);
        if outcome != UpsertOutcome::Noop {
            write_record(&mut *tx, &doc).await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let row = sqlx::query("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_record(&r)).transpose()
    }

    async fn index_record(&self, record: &CatalogRecord) -> Result<()> {
        write_record(&self.pool, record).await
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .with_context(|| format!("record '{}' not found", id))?;
        let existing = row_to_record(&row)?;

        write_record(&mut *tx, &patch.apply_to(&existing)).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn bulk_guarded_upsert(&self, ops: &[GuardedUpsert]) -> Result<Vec<UpsertOutcome>> {
        let mut outcomes = Vec::with_capacity(ops.len());
        for op in ops {
            match self.guarded_upsert_one(op).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(record_id = %op.record.id, error = %e, "guarded upsert failed");
                    outcomes.push(UpsertOutcome::Error(e.to_string()));
                }
            }
        }
        Ok(outcomes)
    }

    async fn search_records(
        &self,
        record_type: RecordType,
        query: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CatalogRecord>> {
        let rows = match query {
            Some(q) if !q.is_empty() => {
                let pattern = format!("%{}%", q);
                sqlx::query(
                    r#"
                    SELECT * FROM records
                    WHERE type = ? AND record_status = 'active'
                      AND (pref_label LIKE ? OR alt_labels LIKE ? OR authors LIKE ?)
                    ORDER BY id
                    LIMIT ?
                    "#,
                )
                .bind(record_type.as_str())
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query(
                    "SELECT * FROM records WHERE type = ? AND record_status = 'active' \
                     ORDER BY id LIMIT ?",
                )
                .bind(record_type.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_record).collect()
    }

    async fn count_records(
        &self,
        record_type: RecordType,
        status: Option<RecordStatus>,
    ) -> Result<i64> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM records WHERE type = ? AND record_status = ?",
                )
                .bind(record_type.as_str())
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE type = ?")
                .bind(record_type.as_str())
                .fetch_one(&self.pool)
                .await?,
        };
        Ok(count)
    }

    async fn refresh(&self) -> Result<()> {
        // SQLite writes are visible to readers as soon as they commit.
        Ok(())
    }

    async fn load_watermark(&self, key: &str) -> Result<Option<SyncWatermark>> {
        let row = sqlx::query(
            "SELECT last_revision_imported, last_updated_at FROM watermarks WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let last_updated_at: String = r.try_get("last_updated_at")?;
            Ok(SyncWatermark {
                last_revision_imported: r.try_get("last_revision_imported")?,
                last_updated_at: DateTime::parse_from_rfc3339(&last_updated_at)?
                    .with_timezone(&Utc),
            })
        })
        .transpose()
    }

    async fn store_watermark(&self, key: &str, watermark: &SyncWatermark) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watermarks (key, last_revision_imported, last_updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                last_revision_imported = excluded.last_revision_imported,
                last_updated_at = excluded.last_updated_at
            "#,
        )
        .bind(key)
        .bind(&watermark.last_revision_imported)
        .bind(watermark.last_updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let diff = event
            .diff
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO audit_events (timestamp, actor, type, record_id, action, diff, correlation_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.actor)
        .bind(event.record_type.as_str())
        .bind(&event.record_id)
        .bind(&event.action)
        .bind(diff)
        .bind(&event.correlation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_history(&self, record_id: &str, limit: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT timestamp, actor, type, record_id, action, diff, correlation_id \
             FROM audit_events WHERE record_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(record_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let timestamp: String = row.try_get("timestamp")?;
                let diff: Option<String> = row.try_get("diff")?;
                Ok(AuditEvent {
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc),
                    actor: row.try_get("actor")?,
                    record_type: row.try_get::<String, _>("type")?.parse()?,
                    record_id: row.try_get("record_id")?,
                    action: row.try_get("action")?,
                    diff: diff.map(|d| serde_json::from_str(&d)).transpose()?,
                    correlation_id: row.try_get("correlation_id")?,
                })
            })
            .collect()
    }
}
