// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error (store failures, broken invariants)
    InternalServerError(String),

    // 400 Bad Request (malformed input that passed deserialization)
    BadRequest(String),

    // 400 Bad Request with field-level detail from `validator`
    Validation(validator::ValidationErrors),

    // 400 Bad Request - operation not valid in the current status
    // (e.g. adding questions after publish, starting before the window)
    InvalidState(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden - actor lacks ownership or role
    PermissionDenied(String),

    // 403 Forbidden - attempt cap reached
    LimitExceeded(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (duplicate username, concurrent attempt start)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Every error body carries the `{"success": false, "message": ...}` envelope;
/// validation failures additionally carry a field-level `errors` list.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Validation(errors) = self {
            let details: Vec<serde_json::Value> = errors
                .field_errors()
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| {
                        json!({
                            "field": field,
                            "message": e
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string()),
                        })
                    })
                })
                .collect();

            let body = Json(json!({
                "success": false,
                "message": "Validation failed",
                "errors": details,
            }));
            return (StatusCode::BAD_REQUEST, body).into_response();
        }

        let (status, message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                // Raw store detail is only exposed in debug builds
                if cfg!(debug_assertions) {
                    (StatusCode::INTERNAL_SERVER_ERROR, msg)
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidState(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::LimitExceeded(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Validation(_) => unreachable!("handled above"),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}
