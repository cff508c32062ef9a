use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::auth::AuthedUser;
use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::Session;

/// `GET /v1/stats/overview`, also served at `/v1/analysis/overview`.
///
/// Reads the materialized per-user row as-is; nothing is computed here.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewResponse {
    pub win_rate: f64,
    pub avg_composure: f64,
    pub avg_rushing_index: f64,
    pub improvement_slope_composure: f64,
    pub improvement_slope_rushing: f64,
    pub total_matches: u32,
    pub recent_sessions: Vec<Session>,
}

pub async fn overview(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let stats = state.store.get_user_stats(user_id).await?;
    let recent_sessions = state.store.list_sessions_by_user(user_id, false, 5).await?;
    Ok(Json(OverviewResponse {
        win_rate: stats.win_rate,
        avg_composure: stats.avg_composure,
        avg_rushing_index: stats.avg_rushing_index,
        improvement_slope_composure: stats.improvement_slope_composure,
        improvement_slope_rushing: stats.improvement_slope_rushing,
        total_matches: stats.total_matches,
        recent_sessions,
    }))
}
