//! Route handlers

pub mod admin;
pub mod auth;
pub mod credits;
pub mod error;
pub mod health;
pub mod members;

use axum::{http::HeaderMap, Router};

use crate::auth::{identity_from_headers, Identity};
use crate::state::AppState;

use self::error::{forbidden, map_auth_error, RouteError};

/// All REST routes of the ledger.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(credits::router())
        .merge(members::router())
        .merge(admin::router())
}

pub(crate) fn caller(state: &AppState, headers: &HeaderMap) -> Result<Identity, RouteError> {
    identity_from_headers(state.auth(), headers).map_err(map_auth_error)
}

/// Resolve the caller and require the path organization to be theirs.
pub(crate) fn org_caller(
    state: &AppState,
    headers: &HeaderMap,
    org_id: &str,
) -> Result<Identity, RouteError> {
    let identity = caller(state, headers)?;
    if identity.org_id != org_id {
        return Err(forbidden("Cross-org access denied"));
    }
    Ok(identity)
}
