//! Request middleware: bearer-token authentication and correlation-id
//! threading.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use faregate_auth::Hs256JwtValidator;
use faregate_infra::write_store::Correlation;

use crate::app::errors;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<Hs256JwtValidator>,
}

/// Correlation identifier for the in-flight request (from the
/// `X-Correlation-Id` header, or generated).
#[derive(Debug, Clone)]
pub struct RequestCorrelation(pub String);

impl RequestCorrelation {
    pub fn to_correlation(&self) -> Correlation {
        Correlation::with_id(self.0.clone())
    }
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| errors::unauthorized("missing or malformed bearer token"))?;

    let identity = state
        .validator
        .validate(token, Utc::now())
        .map_err(|err| errors::unauthorized(&err.to_string()))?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Read (or generate) the correlation id, expose it to handlers, and echo it
/// on the response.
pub async fn correlation_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let correlation_id = req
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    req.extensions_mut()
        .insert(RequestCorrelation(correlation_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
