//! External relevance score provider.
//!
//! Downloads the score file (Turtle, optionally gzipped), caches the
//! decompressed copy next to the database, and parses it into a map from
//! record id to score. Scores are auxiliary import metadata only; a
//! missing or unconfigured score file yields an empty map.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use oxrdf::{Subject, Term};
use oxttl::TurtleParser;
use tracing::{info, warn};

use crate::config::Config;

const SCORE_PREDICATE: &str = "http://purl.bdrc.io/ontology/tmp/entityScore";
const RESOURCE_NS: &str = "http://purl.bdrc.io/resource/";

fn cache_path(config: &Config) -> PathBuf {
    match &config.scores.cache_path {
        Some(path) => path.clone(),
        None => {
            let parent = config
                .db
                .path
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."));
            parent.join("entity_scores.ttl")
        }
    }
}

async fn download_scores(config: &Config, url: &str, force: bool) -> Result<PathBuf> {
    let cache = cache_path(config);
    if cache.exists() && !force {
        info!(path = %cache.display(), "using cached entity scores");
        return Ok(cache);
    }

    info!(url, "downloading entity scores");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.scores.timeout_secs))
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.bytes().await?;

    let content = if url.ends_with(".gz") {
        let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .context("failed to decompress score file")?;
        decompressed
    } else {
        body.to_vec()
    };

    if let Some(parent) = cache.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&cache, &content)?;
    info!(path = %cache.display(), bytes = content.len(), "cached entity scores");

    Ok(cache)
}

/// Load entity scores keyed by record id (e.g. `WA12345`).
///
/// Returns an empty map when no score URL is configured.
pub async fn load_scores(config: &Config, force_download: bool) -> Result<HashMap<String, f64>> {
    let Some(url) = config.scores.url.clone() else {
        info!("no score file configured, importing without scores");
        return Ok(HashMap::new());
    };

    let ttl_path = download_scores(config, &url, force_download).await?;
    let content =
        std::fs::read(&ttl_path).with_context(|| format!("failed to read {}", ttl_path.display()))?;

    let mut scores = HashMap::new();
    for triple in TurtleParser::new().for_reader(content.as_slice()) {
        let triple = triple?;
        if triple.predicate.as_str() != SCORE_PREDICATE {
            continue;
        }
        let Subject::NamedNode(subject) = &triple.subject else {
            continue;
        };
        let Some(local_name) = subject.as_str().strip_prefix(RESOURCE_NS) else {
            continue;
        };
        let Term::Literal(lit) = &triple.object else {
            continue;
        };
        match lit.value().parse::<f64>() {
            Ok(score) => {
                scores.insert(local_name.to_string(), score);
            }
            Err(_) => {
                warn!(record_id = local_name, value = lit.value(), "non-numeric entity score");
            }
        }
    }

    info!(count = scores.len(), "loaded entity scores");
    Ok(scores)
}
