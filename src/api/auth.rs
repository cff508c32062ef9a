//! Bearer-token authentication for the `/v1` surface.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::api::ApiError;

/// The authenticated principal, attached as a request extension.
///
/// The tracker is single-user: every valid token resolves to the
/// configured default user. Handlers still take the id from here rather
/// than from config so multi-user auth can slot in later.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub Uuid);

pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if header.is_empty() {
        return Err(ApiError::Unauthorized("missing authorization".to_string()));
    }
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("invalid token".to_string()))?;
    if token != state.api_token.as_ref() {
        return Err(ApiError::Unauthorized("invalid token".to_string()));
    }

    request
        .extensions_mut()
        .insert(AuthedUser(state.default_user));
    Ok(next.run(request).await)
}
