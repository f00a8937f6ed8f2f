//! HTTP application wiring (router + middleware stack).
//!
//! Structure:
//! - `services.rs`: infrastructure wiring (pools, bus, cache, workers)
//! - `routes/`: handlers, one file per surface area
//! - `dto.rs`: request/response DTOs and JSON mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Router};

use faregate_auth::Hs256JwtValidator;

use crate::config::AppConfig;
use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_runtime, AppServices, Runtime};

/// Assemble the router: public health endpoints plus the protected `/api`
/// surface behind bearer auth, all threaded with a correlation id.
pub fn build_router(services: Arc<AppServices>, config: &AppConfig) -> Router {
    let validator = Arc::new(Hs256JwtValidator::new(
        config.jwt_secret.as_bytes(),
        config.jwt_issuer.clone(),
    ));
    let auth_state = AuthState { validator };

    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/health/live", get(routes::system::live))
        .route("/health/ready", get(routes::system::ready))
        .nest("/api", protected)
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::correlation_middleware))
}
