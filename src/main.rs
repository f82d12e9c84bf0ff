//! # Shelfmark CLI (`shelfmark`)
//!
//! The `shelfmark` binary is the primary interface for the catalog. It
//! provides commands for database initialization, catalog imports,
//! statistics, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! shelfmark --config ./config/shelfmark.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelfmark init` | Create the SQLite database and run schema migrations |
//! | `shelfmark sync <type>` | Import records from the source repositories |
//! | `shelfmark stats` | Record counts per type and lifecycle status |
//! | `shelfmark serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! shelfmark init --config ./config/shelfmark.toml
//!
//! # Incremental import of both record types
//! shelfmark sync all --config ./config/shelfmark.toml
//!
//! # Full reimport of works, capped for a smoke test
//! shelfmark sync work --force --limit 100
//!
//! # See what an import would do without writing
//! shelfmark sync person --dry-run
//!
//! # Start the HTTP API
//! shelfmark serve --config ./config/shelfmark.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shelfmark::models::RecordType;
use shelfmark::store::sqlite::SqliteStore;
use shelfmark::sync::SyncOptions;
use shelfmark::{config, db, migrate, scores, server, stats, sync};

/// Shelfmark CLI — a conflict-aware catalog synced from a git-hosted
/// RDF dataset.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/shelfmark.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "shelfmark",
    about = "Shelfmark — a conflict-aware catalog of works and persons",
    version,
    long_about = "Shelfmark mirrors git-hosted RDF record repositories, imports works and \
    persons incrementally behind per-type revision watermarks, and protects curator edits \
    from being overwritten by later imports. A JSON HTTP API serves search, curation, and \
    sync triggers."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/shelfmark.toml`. Database, server, source
    /// repository, and score settings are read from this file.
    #[arg(long, global = true, default_value = "./config/shelfmark.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (records, watermarks, audit_events). This command is idempotent —
    /// running it multiple times is safe.
    Init,

    /// Import records from the source repositories.
    ///
    /// Clones or pulls the per-type git mirror, decodes changed TriG
    /// record files, and writes them through the conflict-aware upsert.
    /// Incremental by default: only files changed since the stored
    /// watermark revision are processed.
    Sync {
        /// Record type to import: `work`, `person`, or `all`.
        record_type: String,

        /// Ignore the watermark — reimport every record file.
        #[arg(long)]
        force: bool,

        /// Maximum number of record files to process this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Parse and classify without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip the entity score download and import without scores.
        #[arg(long)]
        no_scores: bool,

        /// Override the mirror directory from the config file.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show record counts per type and lifecycle status.
    Stats,

    /// Start the HTTP API server.
    ///
    /// Exposes search, curation, record history, and sync triggers as a
    /// JSON API on the configured bind address.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfmark=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            record_type,
            force,
            limit,
            dry_run,
            no_scores,
            data_dir,
        } => {
            let mut cfg = cfg;
            if let Some(dir) = data_dir {
                cfg.source.data_dir = dir;
            }
            let types: Vec<RecordType> = match record_type.as_str() {
                "all" => vec![RecordType::Work, RecordType::Person],
                "work" => vec![RecordType::Work],
                "person" => vec![RecordType::Person],
                other => anyhow::bail!(
                    "unknown record type '{}', expected work, person, or all",
                    other
                ),
            };

            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let store = SqliteStore::new(pool);

            let score_map = if no_scores {
                Default::default()
            } else {
                scores::load_scores(&cfg, force).await?
            };

            let opts = SyncOptions {
                force,
                limit,
                dry_run,
            };
            for record_type in types {
                let counts = sync::sync_repo(&store, &cfg, record_type, &score_map, opts).await?;
                println!(
                    "{}: {} upserted, {} merged, {} withdrawn, {} skipped",
                    record_type, counts.upserted, counts.merged, counts.withdrawn, counts.skipped
                );
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
