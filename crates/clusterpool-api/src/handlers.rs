//! REST API handlers.
//!
//! Each handler calls into the `ClusterPool` and returns JSON responses.
//! Pool errors map to status codes by kind: capacity problems are 503 so
//! callers know to retry, caller mistakes are 404/409.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use clusterpool_scheduler::AllocError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        })
    }
}

/// Status code and stable machine-readable kind for a pool error.
fn classify(e: &AllocError) -> (StatusCode, &'static str) {
    match e {
        AllocError::PoolExhausted { .. } => (StatusCode::SERVICE_UNAVAILABLE, "pool_exhausted"),
        AllocError::SessionNotBound(_) => (StatusCode::CONFLICT, "session_not_bound"),
        AllocError::SessionAlreadyBound { .. } => (StatusCode::CONFLICT, "session_already_bound"),
        AllocError::EmptySession => (StatusCode::BAD_REQUEST, "empty_session"),
        AllocError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        AllocError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        AllocError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
        AllocError::NoRuntime | AllocError::Registry(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    }
}

fn error_response(e: &AllocError) -> Response {
    let (status, kind) = classify(e);
    debug!(%status, kind, error = %e, "request rejected");
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(e.to_string()),
            kind: Some(kind),
        }),
    )
        .into_response()
}

// ── Sessions ───────────────────────────────────────────────────

/// POST /api/v1/sessions/:session/assign
pub async fn assign(State(state): State<ApiState>, Path(session): Path<String>) -> Response {
    match state.pool.assign(&session) {
        Ok(assignment) => ApiResponse::ok(assignment).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/sessions/:session/release
pub async fn release(State(state): State<ApiState>, Path(session): Path<String>) -> Response {
    match state.pool.release(&session) {
        Ok(resource_id) => ApiResponse::ok(serde_json::json!({
            "resource_id": resource_id,
            "status": "resetting",
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Pool and clusters ──────────────────────────────────────────

/// GET /api/v1/pool
pub async fn pool_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.pool.status()).into_response()
}

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.pool.registry().list()).into_response()
}

/// GET /api/v1/clusters/:id
pub async fn get_cluster(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.pool.get(&id) {
        Ok(resource) => ApiResponse::ok(resource).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/clusters/:id/mark-available
pub async fn mark_available(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.pool.mark_available(&id) {
        Ok(resource) => ApiResponse::ok(resource).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = crate::prometheus::render_prometheus(&state.pool.status());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
