//! Schema migrations for the catalog database.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create all tables and indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            origin TEXT NOT NULL,
            record_status TEXT NOT NULL,
            canonical_id TEXT,
            pref_label TEXT,
            alt_labels TEXT NOT NULL DEFAULT '[]',
            authors TEXT NOT NULL DEFAULT '[]',
            db_score REAL,
            curation TEXT NOT NULL DEFAULT '{}',
            source_meta TEXT NOT NULL DEFAULT '{}',
            import_meta TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create watermarks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS watermarks (
            key TEXT PRIMARY KEY,
            last_revision_imported TEXT NOT NULL,
            last_updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create audit_events table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            actor TEXT NOT NULL,
            type TEXT NOT NULL,
            record_id TEXT NOT NULL,
            action TEXT NOT NULL,
            diff TEXT,
            correlation_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_type ON records(type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_status ON records(record_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_record_id ON audit_events(record_id)")
        .execute(pool)
        .await?;

    Ok(())
}
