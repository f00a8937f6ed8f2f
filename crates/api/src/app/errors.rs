//! Consistent wire error responses.
//!
//! Failures always render as `{"success": false, "error": {code, message}}`
//! with the status code the error kind maps to.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use faregate_core::DomainError;
use faregate_infra::{CommandError, QueryError};

pub fn json_error(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message.into(),
            },
        })),
    )
        .into_response()
}

pub fn unauthorized(message: &str) -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

pub fn domain_error_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DomainError::Unauthorized => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::InsufficientSeats(_) | DomainError::InvalidBookingState { .. } => {
            StatusCode::CONFLICT
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn command_error_response(err: CommandError) -> axum::response::Response {
    match err {
        CommandError::Domain(domain) => domain_error_response(domain),
        CommandError::Conflict(message) => json_error(StatusCode::CONFLICT, "CONFLICT", message),
        CommandError::Unavailable(message) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
        }
    }
}

pub fn query_error_response(err: QueryError) -> axum::response::Response {
    match err {
        QueryError::Domain(domain) => domain_error_response(domain),
        QueryError::Unavailable(message) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
        }
    }
}
