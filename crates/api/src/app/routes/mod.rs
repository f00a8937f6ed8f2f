//! HTTP routes, one module per surface area.

use axum::routing::{get, post};
use axum::Router;

pub mod commands;
pub mod queries;
pub mod system;

/// Protected `/tickets` routes (mounted under `/api` behind auth).
pub fn router() -> Router {
    Router::new()
        .route("/tickets/commands/book", post(commands::book))
        .route("/tickets/commands/reserve", post(commands::reserve))
        .route("/tickets/commands/confirm", post(commands::confirm))
        .route("/tickets/commands/cancel", post(commands::cancel))
        .route("/tickets/commands/refund", post(commands::refund))
        .route("/tickets/queries/my-tickets", get(queries::my_tickets))
        .route("/tickets/queries/:booking_id", get(queries::ticket))
}
