pub mod ai;
pub mod analytics;
pub mod auth;
pub mod conversations;
pub mod credits;
pub mod files;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod schools;
pub mod users;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ErrorKind;

pub(crate) type ApiError = (StatusCode, Json<Value>);
pub(crate) type ApiResult<T = Json<Value>> = Result<T, ApiError>;

/// Standard success envelope.
pub(crate) fn ok(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub(crate) fn fail(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "success": false, "error": message })))
}

/// Logs the technical error, returns the localized generic one.
pub(crate) fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("request failed: {e}");
    fail(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Server.user_message(),
    )
}

pub(crate) fn not_found() -> ApiError {
    fail(StatusCode::NOT_FOUND, ErrorKind::NotFound.user_message())
}

pub(crate) fn forbidden() -> ApiError {
    fail(StatusCode::FORBIDDEN, ErrorKind::Authorization.user_message())
}
