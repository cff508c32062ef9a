use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::AuthedUser;
use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::Opponent;

/// Body for `POST /v1/opponents`. A blank identity key is filled with the
/// generated id before the row is returned.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOpponentRequest {
    pub name: String,
    #[serde(default)]
    pub identity_key: String,
    pub dominant_hand: Option<String>,
    pub play_style: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOpponentsParams {
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct OpponentList {
    pub opponents: Vec<Opponent>,
}

/// Creating an opponent touches no aggregates, so no event is published.
pub async fn create_opponent(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(payload): Json<CreateOpponentRequest>,
) -> Result<(StatusCode, Json<Opponent>), ApiError> {
    let now = Utc::now();
    let mut opponent = Opponent {
        id: Uuid::new_v4(),
        identity_key: payload.identity_key,
        user_id,
        name: payload.name,
        dominant_hand: payload.dominant_hand,
        play_style: payload.play_style,
        notes: payload.notes,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    opponent.ensure_identity_key();

    state.store.create_opponent(opponent.clone()).await?;
    Ok((StatusCode::CREATED, Json(opponent)))
}

pub async fn list_opponents(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<ListOpponentsParams>,
) -> Result<Json<OpponentList>, ApiError> {
    let opponents = state
        .store
        .list_opponents_by_user(user_id, params.include_deleted.unwrap_or(false))
        .await?;
    Ok(Json(OpponentList { opponents }))
}

#[cfg(test)]
mod tests {
    use crate::api::state::AppState;
    use crate::api::build_router;
    use crate::storage::{JsonlStore, StorageConfig, Store};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::util::ServiceExt;
    use uuid::Uuid;

    const TEST_TOKEN: &str = "test-token";

    async fn test_state(dir: &std::path::Path) -> AppState {
        let store = JsonlStore::open(StorageConfig::new(dir.to_path_buf())).unwrap();
        AppState::new(Arc::new(store), TEST_TOKEN, Uuid::new_v4()).await
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

    #[tokio::test]
    async fn test_create_opponent_defaults_identity_key() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path()).await;

        let (status, json) = post_json(
            build_router(state.clone()),
            "/v1/opponents",
            r#"{"name": "Ana"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "Ana");
        assert_eq!(json["identityKey"], json["id"]);

        // No aggregate event fires on opponent creation.
        let stats = state
            .store
            .get_user_stats(state.default_user)
            .await
            .unwrap();
        assert_eq!(stats.last_calculated_at, chrono::DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_create_opponent_keeps_client_identity_key() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path()).await;

        let (status, json) = post_json(
            build_router(state),
            "/v1/opponents",
            r#"{"name": "Marco", "identityKey": "club:marco", "playStyle": "aggressive"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["identityKey"], "club:marco");
        assert_eq!(json["playStyle"], "aggressive");
    }

    #[tokio::test]
    async fn test_list_opponents_returns_created_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let state = test_state(tmp.path()).await;

        for name in ["Ana", "Marco"] {
            let body = format!(r#"{{"name": "{name}"}}"#);
            post_json(build_router(state.clone()), "/v1/opponents", &body).await;
        }

        let (status, json) = get_json(build_router(state), "/v1/opponents").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = json["opponents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Ana", "Marco"]);
    }
}
