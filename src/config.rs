use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub scores: ScoresConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Settings for the git-hosted source dataset.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Base URL the per-type repository names are appended to,
    /// e.g. `https://gitlab.example.org/catalog-data`.
    pub base_url: String,
    /// Directory holding the local repository mirrors.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Repository name for work records.
    pub work_repo: String,
    /// Repository name for person records.
    pub person_repo: String,
    /// Number of record files processed per bulk batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Globs selecting record files within a repository.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/mirrors")
}

fn default_batch_size() -> usize {
    5000
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.trig".to_string()]
}

/// Settings for the external relevance score file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScoresConfig {
    /// URL of the score file (Turtle, optionally gzipped). When unset,
    /// imports run without scores.
    #[serde(default)]
    pub url: Option<String>,
    /// Local cache path for the decompressed score file.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.source.base_url.is_empty() {
        anyhow::bail!("source.base_url must not be empty");
    }
    if config.source.work_repo.is_empty() || config.source.person_repo.is_empty() {
        anyhow::bail!("source.work_repo and source.person_repo must not be empty");
    }
    if config.source.batch_size == 0 {
        anyhow::bail!("source.batch_size must be > 0");
    }
    if config.source.include_globs.is_empty() {
        anyhow::bail!("source.include_globs must not be empty");
    }

    Ok(config)
}

impl SourceConfig {
    /// Repository name for a record type, or None for unknown types.
    pub fn repo_for(&self, record_type: crate::models::RecordType) -> Option<&str> {
        match record_type {
            crate::models::RecordType::Work => Some(&self.work_repo),
            crate::models::RecordType::Person => Some(&self.person_repo),
            crate::models::RecordType::Unknown => None,
        }
    }
}
