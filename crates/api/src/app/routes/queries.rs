//! Query endpoints: list my tickets, get ticket details.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
};

use faregate_auth::AuthenticatedIdentity;
use faregate_booking::BookingStatus;
use faregate_core::BookingId;
use faregate_infra::query_service::DEFAULT_PAGE_LIMIT;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::middleware::RequestCorrelation;

pub async fn my_tickets(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Query(params): Query<dto::MyTicketsQuery>,
) -> axum::response::Response {
    let status = match params.status.as_deref().map(BookingStatus::parse).transpose() {
        Ok(status) => status,
        Err(err) => return errors::domain_error_response(err),
    };

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    match services
        .queries
        .my_tickets(&identity.user_id, status, page, limit)
        .await
    {
        Ok(result) => dto::success(StatusCode::OK, dto::page_to_json(&result), &correlation.0),
        Err(err) => errors::query_error_response(err),
    }
}

pub async fn ticket(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Path(booking_id): Path<String>,
) -> axum::response::Response {
    let booking_id: BookingId = match booking_id.parse() {
        Ok(id) => id,
        Err(err) => return errors::domain_error_response(err),
    };

    match services.queries.ticket(booking_id, &identity.user_id).await {
        Ok(view) => dto::success(StatusCode::OK, dto::ticket_to_json(&view), &correlation.0),
        Err(err) => errors::query_error_response(err),
    }
}
