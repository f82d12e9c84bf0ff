//! Core data models used throughout Shelfmark.
//!
//! These types represent the parsed source records, persisted catalog
//! documents, and sync bookkeeping that flow through the import pipeline.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Record type, assigned once at parse time from the id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Work,
    Person,
    Unknown,
}

impl RecordType {
    /// Detect the record type from the id's first character.
    pub fn from_id(record_id: &str) -> Self {
        match record_id.chars().next() {
            Some('W') => RecordType::Work,
            Some('P') => RecordType::Person,
            _ => RecordType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Work => "work",
            RecordType::Person => "person",
            RecordType::Unknown => "unknown",
        }
    }

    /// Key of the per-type sync watermark document.
    pub fn watermark_key(&self) -> String {
        format!("{}_import_record", self.as_str())
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(RecordType::Work),
            "person" => Ok(RecordType::Person),
            "unknown" => Ok(RecordType::Unknown),
            other => anyhow::bail!("unknown record type: '{}'", other),
        }
    }
}

/// Catalog record lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Duplicate,
    Withdrawn,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Duplicate => "duplicate",
            RecordStatus::Withdrawn => "withdrawn",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "duplicate" => Ok(RecordStatus::Duplicate),
            "withdrawn" => Ok(RecordStatus::Withdrawn),
            other => anyhow::bail!("unknown record status: '{}'", other),
        }
    }
}

/// Where a record came from. Set once at creation, never flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Imported,
    Local,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Imported => "imported",
            Origin::Local => "local",
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imported" => Ok(Origin::Imported),
            "local" => Ok(Origin::Local),
            other => anyhow::bail!("unknown origin: '{}'", other),
        }
    }
}

/// Outcome of the most recent import touch on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportResult {
    UpdatedOrCreated,
    SkippedModified,
}

/// A source record decoded from a single TriG file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub id: String,
    pub record_type: RecordType,
    pub is_released: bool,
    pub replacement_id: Option<String>,
    pub pref_label: Option<String>,
    pub alt_labels: Vec<String>,
    pub authors: Vec<String>,
}

/// A released record ready for the bulk upsert engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub id: String,
    pub record_type: RecordType,
    pub pref_label: Option<String>,
    pub alt_labels: Vec<String>,
    pub authors: Vec<String>,
    pub db_score: Option<f64>,
}

/// Local-edit bookkeeping. `modified` flips to true on the first curator
/// edit and gates import overwrites of content fields from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CurationMeta {
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub edit_version: i64,
}

/// Timestamp of the last successful import touch. Advances on every
/// import pass regardless of curation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourceMeta {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Bookkeeping of the most recent import attempt for a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImportMeta {
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: Option<ImportResult>,
}

/// A catalog record as persisted in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub origin: Origin,
    pub record_status: RecordStatus,
    pub canonical_id: Option<String>,
    pub pref_label: Option<String>,
    #[serde(default)]
    pub alt_labels: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub db_score: Option<f64>,
    #[serde(default)]
    pub curation: CurationMeta,
    #[serde(default)]
    pub source_meta: SourceMeta,
    #[serde(default)]
    pub import_meta: ImportMeta,
}

/// Per-type sync watermark: the last source revision fully imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub last_revision_imported: String,
    pub last_updated_at: DateTime<Utc>,
}

/// Aggregated counts for one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncCounts {
    pub upserted: u64,
    pub merged: u64,
    pub withdrawn: u64,
    pub skipped: u64,
}

impl std::ops::AddAssign for SyncCounts {
    fn add_assign(&mut self, rhs: SyncCounts) {
        self.upserted += rhs.upserted;
        self.merged += rhs.merged;
        self.withdrawn += rhs.withdrawn;
        self.skipped += rhs.skipped;
    }
}

/// An audit trail entry for a single record mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(rename = "id")]
    pub record_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a type-prefixed alphanumeric record id (e.g. `WA3F7K2QD`).
pub fn generate_id(prefix: &str, length: usize) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..length)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", prefix, suffix)
}
