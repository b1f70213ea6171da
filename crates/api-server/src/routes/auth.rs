//! Development token minting.
//!
//! Production tokens come from the identity provider. When
//! `LEDGER_ALLOW_DEV_TOKENS` is set this route signs tokens with the same
//! secret so the API can be exercised locally.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use ledger_core::credit::MemberRole;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

use super::error::{
    bad_request, internal_error, map_auth_error, map_json_rejection, not_found, RouteError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevTokenRequest {
    user_id: String,
    org_id: String,
    role: MemberRole,
    #[serde(default)]
    ttl_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DevTokenResponse {
    token: String,
    expires_at: String,
}

fn format_expiry(exp: usize) -> Option<String> {
    let seconds = i64::try_from(exp).ok()?;
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|value| value.to_rfc3339())
}

async fn issue_dev_token(
    State(state): State<AppState>,
    payload: Result<Json<DevTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DevTokenResponse>), RouteError> {
    if !state.config().allow_dev_tokens {
        return Err(not_found("Not found"));
    }
    let Json(req) = payload.map_err(map_json_rejection)?;
    if req.user_id.trim().is_empty() || req.org_id.trim().is_empty() {
        return Err(bad_request("userId and orgId are required"));
    }

    let ttl_hours = req.ttl_hours.unwrap_or(24).clamp(1, 24 * 30);
    let (token, exp) = state
        .auth()
        .issue(req.user_id.trim(), req.org_id.trim(), req.role, ttl_hours)
        .map_err(map_auth_error)?;
    info!(user_id = %req.user_id, org_id = %req.org_id, "Issued development token");

    Ok((
        StatusCode::CREATED,
        Json(DevTokenResponse {
            token,
            expires_at: format_expiry(exp)
                .ok_or_else(|| internal_error("token expiration out of range"))?,
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/dev/token", post(issue_dev_token))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::config::ServerConfig;
    use crate::routes::test_support::{build_state, send};
    use crate::state::AppState;

    #[tokio::test]
    async fn dev_token_is_accepted_by_verifier() {
        let (state, _temp_dir) = build_state().await;
        let app = super::router().with_state(state.clone());

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/dev/token",
            None,
            Some(json!({"userId": "user_1", "orgId": "org_1", "role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let identity = state
            .auth()
            .verify(body["token"].as_str().unwrap())
            .unwrap();
        assert_eq!(identity.user_id, "user_1");
        assert_eq!(identity.org_id, "org_1");
    }

    #[tokio::test]
    async fn dev_token_route_is_hidden_when_disabled() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = ServerConfig::for_data_dir(temp_dir.path().to_path_buf());
        config.allow_dev_tokens = false;
        let state = AppState::new(config).await.unwrap();
        let app = super::router().with_state(state);

        let (status, _) = send(
            app,
            "POST",
            "/api/v1/dev/token",
            None,
            Some(json!({"userId": "user_1", "orgId": "org_1", "role": "owner"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn expiry_outside_chrono_range_is_rejected() {
        assert!(super::format_expiry(0).is_some());
        assert!(super::format_expiry(usize::MAX).is_none());
    }

    #[tokio::test]
    async fn malformed_token_request_uses_error_envelope() {
        let (state, _temp_dir) = build_state().await;
        let app = super::router().with_state(state);

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/dev/token",
            None,
            Some(json!({"userId": "user_1", "orgId": "org_1", "role": "intern"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }
}
