//! HTTP query endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | `{"query": "..."}` → answer and citations |
//! | `GET`  | `/status` | Configured store name and readiness (plus bucket and
//! |        |           | store-name object when the handle lives in a bucket) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "store_not_configured", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `store_not_configured` (503),
//! `upstream` (502), `internal` (500).

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

use crate::error::Error;
use crate::models::Answer;
use crate::query::QueryService;

/// Where the store handle was read from, when it lives in a bucket.
#[derive(Debug, Clone, Serialize)]
pub struct HandleLocation {
    pub bucket: String,
    pub store_name_blob: String,
}

#[derive(Clone)]
struct AppState {
    service: Arc<QueryService>,
    location: Option<HandleLocation>,
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(service: Arc<QueryService>, location: Option<HandleLocation>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { service, location })
}

/// Bind to `bind` and serve until the process is terminated.
pub async fn run_server(
    bind: &str,
    service: Arc<QueryService>,
    location: Option<HandleLocation>,
) -> anyhow::Result<()> {
    match service.handle() {
        Some(store) => tracing::info!(store = %store, "serving file search store"),
        None => tracing::warn!("no store name found; /ask will fail until the indexer has run"),
    }

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %bind, "query server listening");
    axum::serve(listener, router(service, location)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::StoreNotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "store_not_configured"),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let answer = state.service.ask(&req.query).await.map_err(|e| {
        tracing::warn!(error = %e, "query failed");
        AppError::from(e)
    })?;
    Ok(Json(answer))
}

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    store_name: Option<String>,
    ready: bool,
    #[serde(flatten)]
    location: Option<HandleLocation>,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let store_name = state.service.handle().map(str::to_string);
    Json(StatusResponse {
        ready: store_name.is_some(),
        store_name,
        location: state.location.clone(),
    })
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
