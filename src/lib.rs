//! # Shelfmark
//!
//! A conflict-aware catalog of works and persons, synced from a
//! git-hosted RDF dataset into a searchable document store.
//!
//! Shelfmark mirrors per-type source repositories, decodes TriG record
//! files, and imports them incrementally behind a per-type revision
//! watermark. Curator edits are first-class: once a record is locally
//! modified, imports keep touching its bookkeeping but never overwrite
//! its content fields.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Git mirror │──▶│ Parse +      │──▶│  SQLite   │
//! │ TriG files │   │ classify +   │   │ records + │
//! └────────────┘   │ guarded      │   │ audit     │
//! ┌────────────┐   │ upsert       │   └────┬──────┘
//! │ Score file │──▶│              │        │
//! │ (Turtle)   │   └──────────────┘   ┌────┴─────┐
//! └────────────┘                      ▼          ▼
//!                                ┌────────┐ ┌────────┐
//!                                │  CLI   │ │  HTTP  │
//!                                └────────┘ └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelfmark init                   # create database
//! shelfmark sync all               # import works and persons
//! shelfmark sync work --force      # full reimport of works
//! shelfmark stats                  # record counts per type
//! shelfmark serve                  # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`record`] | TriG record decoding |
//! | [`scores`] | Entity score file loading |
//! | [`git`] | Local git mirrors of the source repositories |
//! | [`classify`] | Per-record import decisions |
//! | [`upsert`] | Conflict-aware bulk upsert engine |
//! | [`sync`] | Import orchestration and watermarks |
//! | [`records`] | Curator-facing record operations |
//! | [`store`] | Document store abstraction (SQLite, in-memory) |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod audit;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod git;
pub mod migrate;
pub mod models;
pub mod record;
pub mod records;
pub mod scores;
pub mod server;
pub mod stats;
pub mod store;
pub mod sync;
pub mod upsert;
