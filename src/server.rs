//! HTTP API server.
//!
//! Exposes the catalog over JSON:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Liveness check |
//! | POST | `/import/sync-catalog` | Trigger a background sync (`?type=work\|person\|all&force=true`) |
//! | GET | `/works` | Search active works (`?q=&limit=`) |
//! | POST | `/works` | Create a work |
//! | GET | `/persons` | Search active persons (`?q=&limit=`) |
//! | POST | `/persons` | Create a person |
//! | GET | `/records/{id}` | Fetch one record |
//! | PATCH | `/records/{id}` | Update content fields |
//! | POST | `/records/{id}/merge` | Merge into a canonical record |
//! | GET | `/records/{id}/history` | Audit trail, newest first |
//!
//! Sync triggers return `202 Accepted` immediately; the import runs in
//! a background task and reports through logs and the watermark.
//!
//! Mutating endpoints read the acting curator from the `x-actor`
//! header, defaulting to `curator`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::error::CatalogError;
use crate::migrate;
use crate::models::{AuditEvent, CatalogRecord, RecordType, SyncCounts};
use crate::records::{self, RecordInput, RecordUpdate};
use crate::scores;
use crate::store::sqlite::SqliteStore;
use crate::store::CatalogStore;
use crate::sync::{self, SyncOptions};

const DEFAULT_ACTOR: &str = "curator";
const DEFAULT_SEARCH_LIMIT: i64 = 25;
const DEFAULT_HISTORY_LIMIT: i64 = 100;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn CatalogStore>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/import/sync-catalog", post(handle_sync_trigger))
        .route("/works", get(handle_search_works).post(handle_create_work))
        .route(
            "/persons",
            get(handle_search_persons).post(handle_create_person),
        )
        .route(
            "/records/{id}",
            get(handle_get_record).patch(handle_update_record),
        )
        .route("/records/{id}/merge", post(handle_merge_record))
        .route("/records/{id}/history", get(handle_record_history))
        .layer(cors)
        .with_state(state);

    println!("Catalog API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"not_found"`, `"conflict"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Maps service-layer errors onto HTTP statuses: missing records become
/// 404, state conflicts 409, everything else a generic 500.
fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<CatalogError>() {
        Some(CatalogError::NotFound { .. }) => AppError {
            status: StatusCode::NOT_FOUND,
            code: "not_found".to_string(),
            message: err.to_string(),
        },
        Some(CatalogError::Conflict(_)) => AppError {
            status: StatusCode::CONFLICT,
            code: "conflict".to_string(),
            message: err.to_string(),
        },
        None => {
            error!(error = %err, "internal error");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message: "internal server error".to_string(),
            }
        }
    }
}

fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Sync trigger ============

#[derive(Deserialize)]
struct SyncParams {
    #[serde(rename = "type", default)]
    record_type: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct SyncAccepted {
    status: String,
    types: Vec<String>,
    force: bool,
}

async fn handle_sync_trigger(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Result<(StatusCode, Json<SyncAccepted>), AppError> {
    let types: Vec<RecordType> = match params.record_type.as_deref() {
        None | Some("all") => vec![RecordType::Work, RecordType::Person],
        Some("work") => vec![RecordType::Work],
        Some("person") => vec![RecordType::Person],
        Some(other) => {
            return Err(bad_request(format!(
                "unknown record type '{}', expected work, person, or all",
                other
            )))
        }
    };

    let accepted = SyncAccepted {
        status: "accepted".to_string(),
        types: types.iter().map(|t| t.to_string()).collect(),
        force: params.force,
    };

    let task_state = state.clone();
    let force = params.force;
    tokio::spawn(async move {
        run_background_sync(task_state, types, force).await;
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn run_background_sync(state: AppState, types: Vec<RecordType>, force: bool) {
    let score_map = match scores::load_scores(&state.config, false).await {
        Ok(map) => map,
        Err(e) => {
            error!(error = %e, "failed to load entity scores, aborting sync");
            return;
        }
    };

    for record_type in types {
        let opts = SyncOptions {
            force,
            ..Default::default()
        };
        match sync::sync_repo(
            state.store.as_ref(),
            &state.config,
            record_type,
            &score_map,
            opts,
        )
        .await
        {
            Ok(SyncCounts {
                upserted,
                merged,
                withdrawn,
                skipped,
            }) => {
                info!(
                    record_type = %record_type,
                    upserted, merged, withdrawn, skipped,
                    "background sync finished"
                );
            }
            Err(e) => {
                error!(record_type = %record_type, error = %e, "background sync failed");
            }
        }
    }
}

// ============ Records ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn search_by_type(
    state: &AppState,
    record_type: RecordType,
    params: SearchParams,
) -> Result<Json<Vec<CatalogRecord>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, 1000);
    let results = state
        .store
        .search_records(record_type, params.q.as_deref(), limit)
        .await
        .map_err(classify_error)?;
    Ok(Json(results))
}

async fn handle_search_works(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CatalogRecord>>, AppError> {
    search_by_type(&state, RecordType::Work, params).await
}

async fn handle_search_persons(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CatalogRecord>>, AppError> {
    search_by_type(&state, RecordType::Person, params).await
}

async fn create_by_type(
    state: &AppState,
    record_type: RecordType,
    headers: HeaderMap,
    input: RecordInput,
) -> Result<(StatusCode, Json<CatalogRecord>), AppError> {
    let actor = actor_from(&headers);
    let record = records::create_record(state.store.as_ref(), record_type, input, &actor)
        .await
        .map_err(classify_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn handle_create_work(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RecordInput>,
) -> Result<(StatusCode, Json<CatalogRecord>), AppError> {
    create_by_type(&state, RecordType::Work, headers, input).await
}

async fn handle_create_person(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RecordInput>,
) -> Result<(StatusCode, Json<CatalogRecord>), AppError> {
    create_by_type(&state, RecordType::Person, headers, input).await
}

async fn handle_get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CatalogRecord>, AppError> {
    let record = records::get_record(state.store.as_ref(), &id)
        .await
        .map_err(classify_error)?;
    Ok(Json(record))
}

async fn handle_update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<RecordUpdate>,
) -> Result<Json<CatalogRecord>, AppError> {
    let actor = actor_from(&headers);
    let record = records::update_record(state.store.as_ref(), &id, update, &actor)
        .await
        .map_err(classify_error)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct MergeBody {
    canonical_id: String,
}

async fn handle_merge_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MergeBody>,
) -> Result<Json<CatalogRecord>, AppError> {
    let actor = actor_from(&headers);
    let record = records::merge_records(state.store.as_ref(), &id, &body.canonical_id, &actor)
        .await
        .map_err(classify_error)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default)]
    limit: Option<i64>,
}

async fn handle_record_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 1000);
    let events = records::record_history(state.store.as_ref(), &id, limit)
        .await
        .map_err(classify_error)?;
    Ok(Json(events))
}
