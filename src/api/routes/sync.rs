use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::auth::AuthedUser;
use crate::api::state::AppState;
use crate::api::{parse_rfc3339, ApiError};
use crate::sync::{PullResponse, PushRequest, PushResponse};

pub async fn push(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, ApiError> {
    let response = state.sync.push(user_id, request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullParams {
    pub updated_after: Option<String>,
}

pub async fn pull(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<PullParams>,
) -> Result<Json<PullResponse>, ApiError> {
    let raw = params
        .updated_after
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("updatedAfter is required".to_string()))?;
    let updated_after = parse_rfc3339(raw, "updatedAfter")?;
    Ok(Json(state.sync.pull(user_id, updated_after).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::state::AppState;
    use crate::api::build_router;
    use crate::models::{MatchSet, Opponent, Session, SessionKind};
    use crate::storage::{JsonlStore, StorageConfig, Store};
    use crate::sync::PushRequest;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    const TEST_TOKEN: &str = "test-token";

    async fn test_state(dir: &std::path::Path) -> AppState {
        let store = JsonlStore::open(StorageConfig::new(dir.to_path_buf())).unwrap();
        AppState::new(Arc::new(store), TEST_TOKEN, Uuid::new_v4()).await
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn post_json(app: axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("authorization", format!("Bearer {TEST_TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    /// One won match against a known opponent, scored 6-4 3-6.
    fn match_batch() -> PushRequest {
        let date = Utc.with_ymd_and_hms(2026, 2, 3, 18, 0, 0).unwrap();
        let session_id = Uuid::new_v4();
        let opponent_id = Uuid::new_v4();
        let client_user = Uuid::new_v4();

        let opponent = Opponent {
            id: opponent_id,
            identity_key: String::new(),
            user_id: client_user,
            name: "Rival".to_string(),
            dominant_hand: None,
            play_style: None,
            notes: None,
            created_at: date,
            updated_at: date,
            deleted_at: None,
        };
        let session = Session {
            id: session_id,
            user_id: client_user,
            opponent_id: Some(opponent_id),
            session_name: "Ladder match".to_string(),
            session_type: SessionKind::Match,
            date,
            duration_minutes: 75,
            rushed_shots: 8,
            unforced_errors: 5,
            long_rallies: 11,
            direction_changes: 16,
            composure: 7,
            focus_text: None,
            followed_focus: None,
            is_match_win: Some(true),
            notes: None,
            created_at: date,
            updated_at: date,
            deleted_at: None,
        };
        let sets = vec![
            MatchSet {
                id: Uuid::new_v4(),
                session_id,
                set_number: 1,
                player_games: 6,
                opponent_games: 4,
                created_at: date,
                updated_at: date,
                deleted_at: None,
            },
            MatchSet {
                id: Uuid::new_v4(),
                session_id,
                set_number: 2,
                player_games: 3,
                opponent_games: 6,
                created_at: date,
                updated_at: date,
                deleted_at: None,
            },
        ];
        PushRequest {
            sessions: vec![session],
            match_sets: sets,
            opponents: vec![opponent],
        }
    }

    #[tokio::test]
    async fn test_push_inserts_then_pull_returns_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path()).await;
        let body = serde_json::to_string(&match_batch()).unwrap();

        let (status, json) = post_json(build_router(state.clone()), "/v1/sync/push", &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"]["inserted"], 1);
        assert_eq!(json["matchSets"]["inserted"], 2);
        assert_eq!(json["opponents"]["inserted"], 1);
        assert!(json["serverTimestamp"].as_str().is_some());

        let (status, json) = get_json(
            build_router(state.clone()),
            "/v1/sync/pull?updatedAfter=1970-01-01T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(json["matchSets"].as_array().unwrap().len(), 2);
        assert_eq!(json["opponents"].as_array().unwrap().len(), 1);
        // Rows are stamped with the authenticated user, not the client's id.
        assert_eq!(
            json["sessions"][0]["userId"],
            state.default_user.to_string()
        );
        assert!(json.get("serverTimestamp").is_none());

        // The push event rebuilt the projections.
        let stats = state
            .store
            .get_user_stats(state.default_user)
            .await
            .unwrap();
        assert_eq!(stats.total_matches, 1);
        assert_eq!(stats.win_rate, 1.0);
    }

    #[tokio::test]
    async fn test_push_retry_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path()).await;
        let body = serde_json::to_string(&match_batch()).unwrap();

        post_json(build_router(state.clone()), "/v1/sync/push", &body).await;
        let (status, json) = post_json(build_router(state), "/v1/sync/push", &body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessions"]["inserted"], 0);
        assert_eq!(json["sessions"]["ignored"], 1);
        assert_eq!(json["matchSets"]["ignored"], 2);
        assert_eq!(json["opponents"]["ignored"], 1);
    }

    #[tokio::test]
    async fn test_pull_validates_watermark() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path()).await;

        let (status, json) = get_json(build_router(state.clone()), "/v1/sync/pull").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"]["message"],
            "Bad request: updatedAfter is required"
        );

        let (status, json) = get_json(
            build_router(state),
            "/v1/sync/pull?updatedAfter=yesterday",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"]["message"],
            "Bad request: updatedAfter must be RFC 3339"
        );
    }
}
