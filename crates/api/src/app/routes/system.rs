//! Health endpoints.

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::{extract::Extension, http::StatusCode, Json};
use serde_json::json;

use faregate_core::BookingId;

use crate::app::services::AppServices;

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

pub async fn live() -> axum::response::Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

/// Ready when the write store answers a trivial lookup.
pub async fn ready(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.write_store.load(BookingId::new()).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "ready"}))).into_response(),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "reason": error.to_string()})),
        )
            .into_response(),
    }
}
