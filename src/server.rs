//! HTTP API for the dashboard.
//!
//! Exposes the assistant, raw retrieval and the crisis policy as JSON
//! endpoints so the display layer can run in a separate process.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ask` | `{question}` → `{answer, tier}` |
//! | `POST` | `/retrieve` | `{query, top_k?, threshold?}` → `{results}` |
//! | `POST` | `/crisis` | `{subsidiary, negative_comments}` → assessment |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_configured` (400), `internal` (500).
//! `/ask` itself never fails once the question is non-blank: service
//! failures are absorbed by the tier ladder and answered with the apology.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! dashboards.

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

use crate::assistant::{Assistant, Tier};
use crate::config::Config;
use crate::crisis::{self, CrisisAssessment, CrisisPolicy, ThresholdPolicy};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    assistant: Arc<Assistant>,
    policy: Option<Arc<ThresholdPolicy>>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>, policy: Option<ThresholdPolicy>) -> Self {
        Self {
            assistant,
            policy: policy.map(Arc::new),
        }
    }
}

/// Routes with CORS applied, ready to serve.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/retrieve", post(handle_retrieve))
        .route("/crisis", post(handle_crisis))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let policy = crisis::policy_from_config(config).ok();
    let state = AppState::new(Arc::new(assistant), policy);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("E-Cris listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
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

fn not_configured(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "not_configured".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
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

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    tier: Tier,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let reply = state.assistant.reply(&req.question).await;
    Ok(Json(AskResponse {
        answer: reply.answer,
        tier: reply.tier.unwrap_or(Tier::Failed),
    }))
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    threshold: Option<f32>,
}

#[derive(Serialize)]
struct RetrieveHit {
    source: String,
    chunk_index: i64,
    score: f32,
    text: String,
}

#[derive(Serialize)]
struct RetrieveResponse {
    results: Vec<RetrieveHit>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.top_k == Some(0) {
        return Err(bad_request("top_k must be >= 1"));
    }

    let retriever = state.assistant.retriever();
    let result = retriever
        .retrieve_with(
            &req.query,
            req.top_k.unwrap_or(retriever.top_k),
            req.threshold.unwrap_or(retriever.threshold),
        )
        .await
        .map_err(|e| internal(e.to_string()))?;

    let results = result
        .into_items()
        .into_iter()
        .map(|s| RetrieveHit {
            source: s.chunk.source,
            chunk_index: s.chunk.chunk_index,
            score: s.score,
            text: s.chunk.text,
        })
        .collect();

    Ok(Json(RetrieveResponse { results }))
}

// ============ POST /crisis ============

#[derive(Deserialize)]
struct CrisisRequest {
    subsidiary: String,
    negative_comments: usize,
}

async fn handle_crisis(
    State(state): State<AppState>,
    Json(req): Json<CrisisRequest>,
) -> Result<Json<CrisisAssessment>, AppError> {
    let policy = state
        .policy
        .as_ref()
        .ok_or_else(|| not_configured("no [crisis] section in the configuration"))?;
    Ok(Json(policy.assess(&req.subsidiary, req.negative_comments)))
}
