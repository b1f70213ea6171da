//! Organization balances, consumption, history and plan routes

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use ledger_core::credit::CreditType;
use ledger_core::ledger::{
    Actor, ConsumeRequest, ConsumptionResult, CreditSummary, HistoryEntry, PlanChange,
    Reconciliation,
};
use ledger_core::plan::{plans, Plan};
use serde::Deserialize;

use crate::state::AppState;

use super::error::{
    bad_request, forbidden, map_json_rejection, map_ledger_error, map_query_rejection, RouteError,
};
use super::org_caller;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "type")]
    pub credit_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub plan_id: String,
}

async fn list_plans() -> Json<&'static [Plan]> {
    Json(plans())
}

async fn get_credits(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CreditSummary>, RouteError> {
    org_caller(&state, &headers, &org_id)?;
    let summary = state
        .ledger()
        .credits(&org_id)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(summary))
}

async fn consume_credits(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ConsumeRequest>, JsonRejection>,
) -> Result<Json<ConsumptionResult>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    let Json(req) = payload.map_err(map_json_rejection)?;
    let result = state
        .ledger()
        .consume(&org_id, &identity.user_id, req)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(result))
}

async fn credit_history(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryEntry>>, RouteError> {
    org_caller(&state, &headers, &org_id)?;
    let Query(params) = params.map_err(map_query_rejection)?;
    let credit_type = match params.credit_type.as_deref() {
        Some(value) if !value.trim().is_empty() => Some(
            value
                .parse::<CreditType>()
                .map_err(|err| bad_request(err.to_string()))?,
        ),
        _ => None,
    };

    let entries = state
        .ledger()
        .history(&org_id, credit_type, params.limit)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(entries))
}

async fn reconcile_credits(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Reconciliation>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    if !identity.role.can_manage_credits() {
        return Err(forbidden("Only owners and admins can reconcile credits"));
    }
    let report = state
        .ledger()
        .reconcile(&org_id)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(report))
}

async fn update_plan(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdatePlanRequest>, JsonRejection>,
) -> Result<Json<PlanChange>, RouteError> {
    let identity = org_caller(&state, &headers, &org_id)?;
    let Json(req) = payload.map_err(map_json_rejection)?;
    let actor = Actor::new(identity.user_id, identity.role);
    let change = state
        .ledger()
        .update_plan(&actor, &org_id, &req.plan_id)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(change))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/plans", get(list_plans))
        .route("/api/v1/orgs/{org_id}/credits", get(get_credits))
        .route("/api/v1/orgs/{org_id}/credits/consume", post(consume_credits))
        .route("/api/v1/orgs/{org_id}/credits/history", get(credit_history))
        .route(
            "/api/v1/orgs/{org_id}/credits/reconcile",
            get(reconcile_credits),
        )
        .route("/api/v1/orgs/{org_id}/plan", put(update_plan))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use ledger_core::credit::MemberRole;
    use serde_json::json;

    use crate::routes::test_support::{add_member, build_state, send, token};

    #[tokio::test]
    async fn plans_are_public() {
        let (state, _temp_dir) = build_state().await;
        let app = super::router().with_state(state);

        let (status, body) = send(app, "GET", "/api/v1/plans", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 5);
        assert_eq!(body[0]["id"], "free");
    }

    #[tokio::test]
    async fn credits_require_a_token() {
        let (state, _temp_dir) = build_state().await;
        let app = super::router().with_state(state);

        let (status, _) = send(app, "GET", "/api/v1/orgs/org_1/credits", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn consume_until_quota_returns_payment_required() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "user_1", MemberRole::Member).await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Member);

        let (status, body) = send(
            super::router().with_state(state.clone()),
            "POST",
            "/api/v1/orgs/org_1/credits/consume",
            Some(&bearer),
            Some(json!({"type": "icp", "amount": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consumed"], 3);
        assert_eq!(body["remaining"], 2);

        let (status, body) = send(
            super::router().with_state(state.clone()),
            "POST",
            "/api/v1/orgs/org_1/credits/consume",
            Some(&bearer),
            Some(json!({"type": "icp", "amount": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["kind"], "quota_exceeded");
        assert_eq!(body["remaining"], 2);
        assert_eq!(body["requested"], 3);

        let (status, body) = send(
            super::router().with_state(state),
            "GET",
            "/api/v1/orgs/org_1/credits/history?type=icp",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["memberEmail"], "user_1@example.com");
    }

    #[tokio::test]
    async fn unknown_credit_type_is_bad_request() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "user_1", MemberRole::Member).await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Member);

        let (status, body) = send(
            super::router().with_state(state.clone()),
            "POST",
            "/api/v1/orgs/org_1/credits/consume",
            Some(&bearer),
            Some(json!({"type": "email", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, _) = send(
            super::router().with_state(state),
            "GET",
            "/api/v1/orgs/org_1/credits/history?type=email",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cross_org_access_is_forbidden() {
        let (state, _temp_dir) = build_state().await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Owner);

        let (status, body) = send(
            super::router().with_state(state),
            "GET",
            "/api/v1/orgs/org_2/credits",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Cross-org access denied");
    }

    #[tokio::test]
    async fn plan_change_requires_admin() {
        let (state, _temp_dir) = build_state().await;
        let member = token(&state, "user_1", "org_1", MemberRole::Member);
        let owner = token(&state, "owner_1", "org_1", MemberRole::Owner);

        let (status, _) = send(
            super::router().with_state(state.clone()),
            "PUT",
            "/api/v1/orgs/org_1/plan",
            Some(&member),
            Some(json!({"planId": "basic"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            super::router().with_state(state.clone()),
            "PUT",
            "/api/v1/orgs/org_1/plan",
            Some(&owner),
            Some(json!({"planId": "basic"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enrichmentLimit"], 1000);

        let (status, body) = send(
            super::router().with_state(state),
            "GET",
            "/api/v1/orgs/org_1/credits",
            Some(&member),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["plan"]["id"], "basic");
        assert_eq!(body["icp"]["limit"], 25);
    }

    #[tokio::test]
    async fn reconcile_reports_consistent_counters() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "user_1", MemberRole::Admin).await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Admin);

        let (status, _) = send(
            super::router().with_state(state.clone()),
            "POST",
            "/api/v1/orgs/org_1/credits/consume",
            Some(&bearer),
            Some(json!({"type": "enrichment", "amount": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            super::router().with_state(state),
            "GET",
            "/api/v1/orgs/org_1/credits/reconcile",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consistent"], true);
    }

    #[tokio::test]
    async fn malformed_consume_bodies_use_error_envelope() {
        let (state, _temp_dir) = build_state().await;
        add_member(&state, "org_1", "user_1", MemberRole::Member).await;
        let bearer = token(&state, "user_1", "org_1", MemberRole::Member);

        for body in [
            json!({"type": "enrichment", "amount": 1.5}),
            json!({"type": "enrichment", "amount": "5"}),
            json!({"type": "enrichment"}),
        ] {
            let (status, payload) = send(
                super::router().with_state(state.clone()),
                "POST",
                "/api/v1/orgs/org_1/credits/consume",
                Some(&bearer),
                Some(body),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(payload["kind"], "validation");
            assert_eq!(payload["retryable"], false);
            assert!(payload["error"].is_string());
        }

        let (status, payload) = send(
            super::router().with_state(state.clone()),
            "POST",
            "/api/v1/orgs/org_1/credits/consume",
            Some(&bearer),
            Some(json!({"amount": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["kind"], "validation");

        let (status, payload) = send(
            super::router().with_state(state.clone()),
            "GET",
            "/api/v1/orgs/org_1/credits/history?limit=many",
            Some(&bearer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["kind"], "validation");

        let summary = state.ledger().credits("org_1").await.unwrap();
        assert_eq!(summary.enrichment.used, 0);
    }
}
