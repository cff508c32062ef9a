//! REST API endpoints.
//!
//! Axum-based HTTP API for recording sessions, syncing offline batches,
//! and querying derived analytics. Everything under `/v1` requires a
//! bearer token; `/healthz` is open.

pub mod auth;
pub mod routes;
pub mod state;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::projections::ProjectionError;
use crate::storage::StorageError;
use crate::sync::SyncError;
use state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Parse an optional RFC 3339 query value. Invalid input is a 400, not a
/// silently-dropped filter.
pub(crate) fn parse_rfc3339(raw: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("{field} must be RFC 3339")))
}

pub(crate) fn parse_date_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ApiError> {
    let from = from.map(|raw| parse_rfc3339(raw, "from")).transpose()?;
    let to = to.map(|raw| parse_rfc3339(raw, "to")).transpose()?;
    Ok((from, to))
}

/// `GET /healthz`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Assemble the full application router.
pub fn build_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route(
            "/sessions",
            post(routes::sessions::create_session).get(routes::sessions::list_sessions),
        )
        .route(
            "/opponents",
            post(routes::opponents::create_opponent).get(routes::opponents::list_opponents),
        )
        .route("/sync/push", post(routes::sync::push))
        .route("/sync/pull", get(routes::sync::pull))
        .route("/stats/overview", get(routes::stats::overview))
        .route("/analysis/overview", get(routes::stats::overview))
        .route("/analysis/trends", get(routes::analysis::trends))
        .route("/analysis/correlations", get(routes::analysis::correlations))
        .route(
            "/analysis/opponents/:id",
            get(routes::analysis::opponent_analysis),
        )
        .route("/analysis/insights", get(routes::analysis::insights))
        .route("/meta/traffic", get(routes::traffic::traffic_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/healthz", get(health))
        .nest("/v1", guarded)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::traffic::record_traffic,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
