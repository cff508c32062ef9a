use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::AuthedUser;
use crate::api::state::AppState;
use crate::api::{parse_date_range, ApiError};
use crate::models::{MatchSet, Session};
use crate::stats::{
    average_composure, average_rushing_index, bucket_start, build_deep_insights,
    correlation_composure_vs_win, correlation_followed_focus_vs_rushing,
    correlation_long_rallies_vs_win, correlation_rushing_vs_win, round4, rushing_index, win_rate,
    DeepInsights, Granularity,
};

/// Common query parameters for the analysis endpoints. All optional; an
/// unknown granularity falls back to weekly bucketing.
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub granularity: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeParams {
    fn granularity(&self) -> Granularity {
        Granularity::from_param(self.granularity.as_deref().unwrap_or(""))
    }
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub granularity: Granularity,
    pub series: Vec<TrendPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub bucket_start_date: DateTime<Utc>,
    pub avg_composure: f64,
    pub avg_rushing_index: f64,
    pub win_rate: f64,
    pub matches_played: u32,
    pub total_session_rows: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationsResponse {
    pub composure_vs_win: Option<f64>,
    pub rushing_vs_win: Option<f64>,
    pub followed_focus_vs_rushing: Option<f64>,
    pub long_rallies_vs_win: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentAnalysisResponse {
    pub matches_played: u32,
    pub win_rate: f64,
    pub avg_composure: f64,
    pub avg_rushing_index: f64,
    pub avg_set_differential: f64,
    pub match_history: Vec<MatchHistoryRow>,
}

/// One competitive session against the opponent, newest first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHistoryRow {
    pub session_id: Uuid,
    pub session_name: String,
    pub date: DateTime<Utc>,
    pub is_match_win: Option<bool>,
    pub composure: i32,
    pub rushing_index: f64,
    pub set_differential: i32,
    pub notes: Option<String>,
}

/// `GET /v1/analysis/trends`
pub async fn trends(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<RangeParams>,
) -> Result<Json<TrendsResponse>, ApiError> {
    let (from, to) = parse_date_range(params.from.as_deref(), params.to.as_deref())?;
    let sessions = state
        .store
        .list_sessions_by_date_range(user_id, from, to)
        .await?;
    let granularity = params.granularity();
    Ok(Json(TrendsResponse {
        granularity,
        series: aggregate_trends(&sessions, granularity),
    }))
}

/// `GET /v1/analysis/correlations`
pub async fn correlations(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<RangeParams>,
) -> Result<Json<CorrelationsResponse>, ApiError> {
    let (from, to) = parse_date_range(params.from.as_deref(), params.to.as_deref())?;
    let sessions = state
        .store
        .list_sessions_by_date_range(user_id, from, to)
        .await?;
    Ok(Json(CorrelationsResponse {
        composure_vs_win: correlation_composure_vs_win(&sessions),
        rushing_vs_win: correlation_rushing_vs_win(&sessions),
        followed_focus_vs_rushing: correlation_followed_focus_vs_rushing(&sessions),
        long_rallies_vs_win: correlation_long_rallies_vs_win(&sessions),
    }))
}

/// `GET /v1/analysis/opponents/:id`
pub async fn opponent_analysis(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Path(raw_id): Path<String>,
) -> Result<Json<OpponentAnalysisResponse>, ApiError> {
    let opponent_id = Uuid::parse_str(&raw_id)
        .map_err(|_| ApiError::BadRequest("invalid opponent id".to_string()))?;

    let stats = state.store.get_opponent_stats(opponent_id).await?;
    let sessions = state
        .store
        .list_match_sessions_by_opponent(user_id, opponent_id)
        .await?;
    let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
    let sets = state
        .store
        .list_match_sets_by_session_ids(&session_ids)
        .await?;

    Ok(Json(OpponentAnalysisResponse {
        matches_played: stats.matches_played,
        win_rate: stats.win_rate,
        avg_composure: stats.avg_composure,
        avg_rushing_index: stats.avg_rushing_index,
        avg_set_differential: stats.avg_set_differential,
        match_history: build_match_history(&sessions, &sets),
    }))
}

/// `GET /v1/analysis/insights`
pub async fn insights(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<RangeParams>,
) -> Result<Json<DeepInsights>, ApiError> {
    let (from, to) = parse_date_range(params.from.as_deref(), params.to.as_deref())?;
    let sessions = state
        .store
        .list_sessions_by_date_range(user_id, from, to)
        .await?;
    let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
    let sets = state
        .store
        .list_match_sets_by_session_ids(&session_ids)
        .await?;
    let opponents = state.store.list_opponents_by_user(user_id, true).await?;
    let names: HashMap<Uuid, String> = opponents.into_iter().map(|o| (o.id, o.name)).collect();

    Ok(Json(build_deep_insights(
        &sessions,
        &sets,
        &names,
        params.granularity(),
    )))
}

fn aggregate_trends(items: &[Session], granularity: Granularity) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<DateTime<Utc>, (Vec<Session>, Vec<Session>)> = BTreeMap::new();
    for item in items {
        let bucket = buckets.entry(bucket_start(item.date, granularity)).or_default();
        bucket.0.push(item.clone());
        if item.is_match() {
            bucket.1.push(item.clone());
        }
    }
    buckets
        .into_iter()
        .map(|(key, (all, matches))| TrendPoint {
            bucket_start_date: key,
            avg_composure: round4(average_composure(&all)),
            avg_rushing_index: round4(average_rushing_index(&all)),
            win_rate: round4(win_rate(&matches)),
            matches_played: matches.len() as u32,
            total_session_rows: all.len() as u32,
        })
        .collect()
}

/// Sum set scores per session, skipping deleted sets. A session with no
/// stored sets still gets a row, with a zero differential.
fn build_match_history(
    items: &[Session],
    sets_by_session: &HashMap<Uuid, Vec<MatchSet>>,
) -> Vec<MatchHistoryRow> {
    items
        .iter()
        .map(|s| {
            let set_differential = sets_by_session
                .get(&s.id)
                .map(|sets| {
                    sets.iter()
                        .filter(|set| !set.is_deleted())
                        .map(MatchSet::games_differential)
                        .sum()
                })
                .unwrap_or(0);
            MatchHistoryRow {
                session_id: s.id,
                session_name: s.session_name.clone(),
                date: s.date,
                is_match_win: s.is_match_win,
                composure: s.composure,
                rushing_index: round4(rushing_index(s)),
                set_differential,
                notes: s.notes.clone(),
            }
        })
        .collect()
}
