//! Organization member routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use ledger_core::credit::{MemberLimitsPatch, MemberSync};
use ledger_core::ledger::{Actor, MemberCreditSnapshot};
use serde::Deserialize;

use crate::state::AppState;

use super::error::{forbidden, map_json_rejection, map_ledger_error, RouteError};
use super::org_caller;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMemberRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Register the caller as a member of their organization.
async fn sync_member(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<SyncMemberRequest>, JsonRejection>,
) -> Result<Json<MemberCreditSnapshot>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    let Json(req) = payload.map_err(map_json_rejection)?;

    let member = state
        .ledger()
        .sync_member(MemberSync {
            org_id,
            user_id: identity.user_id,
            role: identity.role,
            email: req.email.or(identity.email),
            display_name: req.display_name.or(identity.name),
        })
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(MemberCreditSnapshot::from(&member)))
}

async fn list_members(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<MemberCreditSnapshot>>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    let actor = Actor::new(identity.user_id, identity.role);
    let members = state
        .ledger()
        .member_usage(&actor, &org_id)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(members))
}

async fn get_member_limits(
    State(state): State<AppState>,
    Path((org_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MemberCreditSnapshot>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    if identity.user_id != user_id && !identity.role.can_manage_credits() {
        return Err(forbidden("Only owners and admins can view other members' limits"));
    }
    let snapshot = state
        .ledger()
        .member_limits(&org_id, &user_id)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(snapshot))
}

async fn update_member_limits(
    State(state): State<AppState>,
    Path((org_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Result<Json<MemberLimitsPatch>, JsonRejection>,
) -> Result<Json<MemberCreditSnapshot>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    let Json(patch) = payload.map_err(map_json_rejection)?;
    let actor = Actor::new(identity.user_id, identity.role);
    let snapshot = state
        .ledger()
        .set_member_limits(&actor, &org_id, &user_id, patch)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(snapshot))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/orgs/{org_id}/members/sync", post(sync_member))
        .route("/api/v1/orgs/{org_id}/members", get(list_members))
        .route(
            "/api/v1/orgs/{org_id}/members/{user_id}/limits",
            get(get_member_limits).put(update_member_limits),
        )
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use ledger_core::credit::MemberRole;
    use serde_json::json;

    use crate::routes::test_support::{add_member, build_state, send, token};

    #[tokio::test]
    async fn sync_registers_the_caller() {
        let (state, _temp_dir) = build_state().await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Member);

        let (status, body) = send(
            super::router().with_state(state.clone()),
            "POST",
            "/api/v1/orgs/org_1/members/sync",
            Some(&bearer),
            Some(json!({"email": "user_1@example.com", "displayName": "User One"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], "user_1");
        assert_eq!(body["role"], "member");
        assert_eq!(body["displayName"], "User One");

        let member = state
            .ledger()
            .member_limits("org_1", "user_1")
            .await
            .unwrap();
        assert_eq!(member.email.as_deref(), Some("user_1@example.com"));
    }

    #[tokio::test]
    async fn admin_sets_member_limits() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "admin_1", MemberRole::Admin).await;
        add_member(&state, "org_1", "user_1", MemberRole::Member).await;
        let admin = token(&state, "admin_1", "org_1", MemberRole::Admin);

        let (status, body) = send(
            super::router().with_state(state.clone()),
            "PUT",
            "/api/v1/orgs/org_1/members/user_1/limits",
            Some(&admin),
            Some(json!({"icpLimit": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["icp"]["limit"], 2);

        let (status, body) = send(
            super::router().with_state(state),
            "PUT",
            "/api/v1/orgs/org_1/members/user_1/limits",
            Some(&admin),
            Some(json!({"icpLimit": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["icp"]["limit"].is_null());
    }

    #[tokio::test]
    async fn admin_cannot_edit_owner() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "owner_1", MemberRole::Owner).await;
        add_member(&state, "org_1", "admin_1", MemberRole::Admin).await;
        let admin = token(&state, "admin_1", "org_1", MemberRole::Admin);

        let (status, body) = send(
            super::router().with_state(state),
            "PUT",
            "/api/v1/orgs/org_1/members/owner_1/limits",
            Some(&admin),
            Some(json!({"isBlocked": true})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");
    }

    #[tokio::test]
    async fn members_see_only_their_own_limits() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "user_1", MemberRole::Member).await;
        add_member(&state, "org_1", "user_2", MemberRole::Member).await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Member);

        let (status, _) = send(
            super::router().with_state(state.clone()),
            "GET",
            "/api/v1/orgs/org_1/members/user_1/limits",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            super::router().with_state(state.clone()),
            "GET",
            "/api/v1/orgs/org_1/members/user_2/limits",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            super::router().with_state(state),
            "GET",
            "/api/v1/orgs/org_1/members",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_limits_body_uses_error_envelope() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "admin_1", MemberRole::Admin).await;
        add_member(&state, "org_1", "user_1", MemberRole::Member).await;
        let admin = token(&state, "admin_1", "org_1", MemberRole::Admin);

        let (status, body) = send(
            super::router().with_state(state),
            "PUT",
            "/api/v1/orgs/org_1/members/user_1/limits",
            Some(&admin),
            Some(json!({"icpLimit": "ten"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }
}
