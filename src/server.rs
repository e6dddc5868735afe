//! HTTP API.
//!
//! Exposes the analysis engine as a JSON API for the report UI and other
//! clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/analyze` | Analyze a submission; returns the persisted report record |
//! | `PUT`    | `/corpus/{id}` | Add or replace a corpus document |
//! | `DELETE` | `/corpus/{id}` | Remove a corpus document |
//! | `GET`    | `/reports` | Run history, newest first (`?risk=&search=&limit=`) |
//! | `GET`    | `/reports/{run_id}` | Fetch a persisted report record |
//! | `GET`    | `/stats` | Corpus statistics and risk distribution |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "document essay-1: no tokens after normalization" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `cancelled` (409), `index_corruption` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser UI can
//! call the API from another origin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use simcheck_core::store::{ReportRecord, ReportSummary};
use simcheck_core::{AnalysisError, CorpusDocument, HistoryFilter, IngestOutcome, OriginTag};

use crate::config::Config;
use crate::engine::{open_engine, AnalysisRequest, CancelToken, Engine};
use crate::get::get_report;
use crate::history::list_history;
use crate::progress::ProgressMode;
use crate::stats::{collect_stats, StatsResponse};

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = Arc::new(open_engine(config, ProgressMode::Off.reporter()).await?);

    let app = router(engine);

    info!(bind = %bind_addr, "simcheck server listening");
    println!("simcheck server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router over a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/analyze", post(handle_analyze))
        .route("/corpus/{id}", put(handle_put_corpus).delete(handle_delete_corpus))
        .route("/reports", get(handle_list_reports))
        .route("/reports/{run_id}", get(handle_get_report))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(engine)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
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

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let (status, code) = match &err {
            AnalysisError::Encoding { .. }
            | AnalysisError::EmptyDocument { .. }
            | AnalysisError::InvalidParams(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AnalysisError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            AnalysisError::Timeout { .. } => (StatusCode::REQUEST_TIMEOUT, "timeout"),
            AnalysisError::Cancelled { .. } => (StatusCode::CONFLICT, "cancelled"),
            AnalysisError::IndexCorruption { .. } | AnalysisError::Storage { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.code())
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

/// Runs the analysis and persists the record. Dropping the request drops
/// the run: queued alignments never start, and any already running on the
/// blocking pool finish with their results discarded.
async fn handle_analyze(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<ReportRecord>, AppError> {
    let record = engine
        .analyze_and_record(&request, &CancelToken::new())
        .await?;
    Ok(Json(record))
}

// ============ PUT/DELETE /corpus/{id} ============

/// Request body for `PUT /corpus/{id}`.
#[derive(Debug, Deserialize)]
struct CorpusDocumentBody {
    raw_text: String,
    author_id: String,
    origin: OriginTag,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

async fn handle_put_corpus(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<CorpusDocumentBody>,
) -> Result<Json<IngestOutcome>, AppError> {
    let outcome = engine
        .ingest_corpus_document(CorpusDocument {
            document_id: id,
            raw_text: body.raw_text,
            author_id: body.author_id,
            origin: body.origin,
            title: body.title,
            url: body.url,
        })
        .await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct RemovedResponse {
    removed: String,
}

async fn handle_delete_corpus(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Json<RemovedResponse>, AppError> {
    engine.remove_corpus_document(&id).await?;
    Ok(Json(RemovedResponse { removed: id }))
}

// ============ GET /reports ============

async fn handle_list_reports(
    State(engine): State<Arc<Engine>>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<ReportSummary>>, AppError> {
    list_history(engine.store().as_ref(), &filter)
        .await
        .map(Json)
        .map_err(internal)
}

// ============ GET /reports/{run_id} ============

async fn handle_get_report(
    State(engine): State<Arc<Engine>>,
    Path(run_id): Path<String>,
) -> Result<Json<ReportRecord>, AppError> {
    let store = engine.store();
    match get_report(store.as_ref(), &run_id).await {
        Ok(record) => Ok(Json(record)),
        Err(e) if e.to_string().contains("not found") => Err(not_found(e.to_string())),
        Err(e) => Err(internal(e)),
    }
}

// ============ GET /stats ============

async fn handle_stats(State(engine): State<Arc<Engine>>) -> Result<Json<StatsResponse>, AppError> {
    collect_stats(&engine).await.map(Json).map_err(internal)
}
