//! Error responses shared by the route handlers

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    Json,
};
use ledger_core::{Error, ErrorKind};
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<i64>,
}

pub type RouteError = (StatusCode, Json<ErrorResponse>);

pub fn route_error(status: StatusCode, kind: &'static str, error: impl Into<String>) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            kind,
            retryable: false,
            remaining: None,
            requested: None,
        }),
    )
}

pub fn forbidden(error: impl Into<String>) -> RouteError {
    route_error(StatusCode::FORBIDDEN, "forbidden", error)
}

pub fn not_found(error: impl Into<String>) -> RouteError {
    route_error(StatusCode::NOT_FOUND, "not_found", error)
}

pub fn bad_request(error: impl Into<String>) -> RouteError {
    route_error(StatusCode::BAD_REQUEST, "validation", error)
}

pub fn internal_error(error: impl std::fmt::Display) -> RouteError {
    route_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        error.to_string(),
    )
}

pub fn map_json_rejection(rejection: JsonRejection) -> RouteError {
    bad_request(rejection.body_text())
}

pub fn map_query_rejection(rejection: QueryRejection) -> RouteError {
    bad_request(rejection.body_text())
}

pub fn map_auth_error(err: AuthError) -> RouteError {
    match err {
        AuthError::Signing(_) => internal_error(err),
        _ => route_error(StatusCode::UNAUTHORIZED, "unauthorized", err.to_string()),
    }
}

pub fn map_ledger_error(err: Error) -> RouteError {
    let (status, kind) = match err.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::QuotaExceeded => (StatusCode::PAYMENT_REQUIRED, "quota_exceeded"),
        ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        ErrorKind::Persistence => (StatusCode::INTERNAL_SERVER_ERROR, "persistence"),
    };
    if status.is_server_error() {
        error!("Ledger storage failure: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind,
            retryable: err.is_retryable(),
            remaining: err.remaining(),
            requested: err.requested(),
        }),
    )
}
