//! Platform operator routes

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use ledger_core::ledger::PlatformStats;
use serde::Deserialize;
use tracing::warn;

use crate::state::AppState;

use super::caller;
use super::error::{forbidden, map_ledger_error, map_query_rejection, RouteError};

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub top: Option<usize>,
}

async fn platform_stats(
    State(state): State<AppState>,
    params: Result<Query<StatsParams>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Json<PlatformStats>, RouteError> {
    let identity = caller(&state, &headers)?;
    let Query(params) = params.map_err(map_query_rejection)?;
    if !state.config().is_superuser(&identity.user_id) {
        warn!(user_id = %identity.user_id, "Rejected platform stats request");
        return Err(forbidden("Superuser access required"));
    }
    let stats = state
        .ledger()
        .platform_stats(params.top)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(stats))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/admin/stats", get(platform_stats))
}
