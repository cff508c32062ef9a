use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::AuthedUser;
use crate::api::state::AppState;
use crate::api::ApiError;
use crate::events::Event;
use crate::models::{Session, SessionKind};

/// Body for `POST /v1/sessions`. The server owns the id and timestamps;
/// client-authored ids and timestamps go through sync push instead.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub opponent_id: Option<Uuid>,
    pub session_name: String,
    pub session_type: SessionKind,
    pub date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub rushed_shots: i32,
    pub unforced_errors: i32,
    pub long_rallies: i32,
    pub direction_changes: i32,
    pub composure: i32,
    pub focus_text: Option<String>,
    pub followed_focus: Option<String>,
    pub is_match_win: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsParams {
    pub include_deleted: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<Session>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4(),
        user_id,
        opponent_id: payload.opponent_id,
        session_name: payload.session_name,
        session_type: payload.session_type,
        date: payload.date,
        duration_minutes: payload.duration_minutes,
        rushed_shots: payload.rushed_shots,
        unforced_errors: payload.unforced_errors,
        long_rallies: payload.long_rallies,
        direction_changes: payload.direction_changes,
        composure: payload.composure,
        focus_text: payload.focus_text,
        followed_focus: payload.followed_focus,
        is_match_win: payload.is_match_win,
        notes: payload.notes,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    state.store.create_session(session.clone()).await?;

    // Row is durable at this point; a recompute failure still fails the
    // request so the client knows the aggregates are stale.
    state
        .bus
        .publish(&Event::SessionCreated { user_id })
        .await
        .map_err(|err| ApiError::Internal(format!("session saved but projections are stale: {err}")))?;

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<SessionList>, ApiError> {
    let include_deleted = params.include_deleted.unwrap_or(false);
    let sessions = state
        .store
        .list_sessions_by_user(user_id, include_deleted, params.limit.unwrap_or(0))
        .await?;
    Ok(Json(SessionList { sessions }))
}
