//! Local HTTP API.
//!
//! Serves the browser extension and any other local client.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/save` | Capture a web clipping `{ title, url, html }` |
//! | `POST` | `/search` | Semantic search `{ query }` |
//! | `POST` | `/chat` | Grounded chat `{ query }` |
//! | `POST` | `/record/start` | Begin a voice memo session |
//! | `POST` | `/record/stop` | End the session, transcribe, ingest |
//! | `GET`  | `/health` | Liveness and corpus counters |
//!
//! # Error Contract
//!
//! `/save` keeps the flat shape the extension expects: `{ "status":
//! "success" }` on success, `{ "status": "<error code>" }` otherwise.
//! Every other endpoint reports failures as:
//!
//! ```json
//! { "error": { "code": "not_recording", "message": "no recording session is active" } }
//! ```
//!
//! with the code taken from the engine error taxonomy.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: requests come from
//! extension content scripts running under arbitrary page origins.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::{ChatAnswer, SearchResult};

/// Build the application router around a shared engine.
pub fn build_router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/save", post(handle_save))
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .route("/record/start", post(handle_record_start))
        .route("/record/stop", post(handle_record_stop))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

/// Bind the configured address and serve until the process exits.
pub async fn run_server(engine: Arc<Engine>) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        engine.config().server.host,
        engine.config().server.port
    );
    let app = build_router(engine);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");
    println!("memex listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error responses ============

fn http_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::EmptyContent => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyRecording | EngineError::NotRecording => StatusCode::CONFLICT,
        EngineError::EmbeddingBackendUnavailable(_)
        | EngineError::GenerationBackendUnavailable(_)
        | EngineError::TranscriptionFailed(_) => StatusCode::BAD_GATEWAY,
        EngineError::CaptureFailed(_) | EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Engine failure rendered as the standard error envelope.
struct AppError(EngineError);

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (http_status(&self.0), Json(body)).into_response()
    }
}

/// Engine failure rendered in the flat `/save` shape.
struct SaveError(EngineError);

impl From<EngineError> for SaveError {
    fn from(err: EngineError) -> Self {
        SaveError(err)
    }
}

impl IntoResponse for SaveError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "status": self.0.code() });
        (http_status(&self.0), Json(body)).into_response()
    }
}

// ============ POST /save ============

#[derive(Deserialize)]
struct SaveRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    html: String,
}

#[derive(Serialize)]
struct SaveResponse {
    status: String,
    id: String,
}

async fn handle_save(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, SaveError> {
    let title = if req.title.trim().is_empty() {
        None
    } else {
        Some(req.title)
    };
    let outcome = engine.ingest_clip(title, req.url, req.html).await?;

    Ok(Json(SaveResponse {
        status: "success".to_string(),
        id: outcome.document_id,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    /// Optional override for the configured result count.
    #[serde(default)]
    k: Option<usize>,
    /// Optional override for the configured score floor.
    #[serde(default)]
    min_score: Option<f32>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = engine
        .search_notes_with(&req.query, req.k, req.min_score)
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
}

async fn handle_chat(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    let answer = engine.chat_with_notes(&req.query).await?;
    Ok(Json(answer))
}

// ============ POST /record/start, /record/stop ============

#[derive(Serialize)]
struct RecordStartResponse {
    status: String,
}

async fn handle_record_start(
    State(engine): State<Arc<Engine>>,
) -> Result<Json<RecordStartResponse>, AppError> {
    engine.start_recording()?;
    Ok(Json(RecordStartResponse {
        status: "recording".to_string(),
    }))
}

#[derive(Serialize)]
struct RecordStopResponse {
    status: String,
    transcript: String,
    document_id: String,
}

async fn handle_record_stop(
    State(engine): State<Arc<Engine>>,
) -> Result<Json<RecordStopResponse>, AppError> {
    let memo = engine.stop_recording().await?;
    Ok(Json(RecordStopResponse {
        status: "stopped".to_string(),
        transcript: memo.transcript,
        document_id: memo.document_id,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: i64,
    index_entries: usize,
}

async fn handle_health(
    State(engine): State<Arc<Engine>>,
) -> Result<Json<HealthResponse>, AppError> {
    let documents = engine.count_documents().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents,
        index_entries: engine.index_len(),
    }))
}
