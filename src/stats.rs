//! Catalog statistics overview.
//!
//! Quick summary of what's in the catalog: record counts per type and
//! lifecycle status, curated and merged totals, and the last sync per
//! record type. Used by `shelfmark stats` to check that imports are
//! landing as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-type breakdown of record counts.
struct TypeStats {
    record_type: String,
    active: i64,
    duplicate: i64,
    withdrawn: i64,
    curated: i64,
    last_sync: Option<String>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(&pool)
        .await?;

    let total_audit: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_events")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Shelfmark — Catalog Stats");
    println!("=========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Records:       {}", total_records);
    println!("  Audit events:  {}", total_audit);

    let type_rows = sqlx::query(
        r#"
        SELECT
            type,
            SUM(CASE WHEN record_status = 'active' THEN 1 ELSE 0 END) AS active,
            SUM(CASE WHEN record_status = 'duplicate' THEN 1 ELSE 0 END) AS duplicate,
            SUM(CASE WHEN record_status = 'withdrawn' THEN 1 ELSE 0 END) AS withdrawn,
            SUM(CASE WHEN json_extract(curation, '$.modified') THEN 1 ELSE 0 END) AS curated
        FROM records
        GROUP BY type
        ORDER BY type
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let watermark_rows = sqlx::query("SELECT key, last_updated_at FROM watermarks")
        .fetch_all(&pool)
        .await?;

    let mut type_stats: Vec<TypeStats> = Vec::new();
    for row in &type_rows {
        let record_type: String = row.get("type");
        let watermark_key = format!("{}_import_record", record_type);
        let last_sync = watermark_rows
            .iter()
            .find(|w| {
                let key: String = w.get("key");
                key == watermark_key
            })
            .map(|w| w.get::<String, _>("last_updated_at"));

        type_stats.push(TypeStats {
            record_type,
            active: row.get("active"),
            duplicate: row.get("duplicate"),
            withdrawn: row.get("withdrawn"),
            curated: row.get("curated"),
            last_sync,
        });
    }

    if !type_stats.is_empty() {
        println!();
        println!("  By type:");
        println!(
            "  {:<10} {:>8} {:>10} {:>10} {:>8}   {}",
            "TYPE", "ACTIVE", "DUPLICATE", "WITHDRAWN", "CURATED", "LAST SYNC"
        );
        println!("  {}", "-".repeat(72));

        for s in &type_stats {
            let sync_display = match &s.last_sync {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<10} {:>8} {:>10} {:>10} {:>8}   {}",
                s.record_type, s.active, s.duplicate, s.withdrawn, s.curated, sync_display
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp as a relative time string.
fn format_ts_relative(rfc3339: &str) -> String {
    let Ok(then) = chrono::DateTime::parse_from_rfc3339(rfc3339) else {
        return rfc3339.to_string();
    };
    let delta = chrono::Utc::now().timestamp() - then.timestamp();

    if delta < 0 {
        return then.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        then.format("%Y-%m-%d %H:%M").to_string()
    }
}
