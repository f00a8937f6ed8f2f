//! Command endpoints: book, reserve, confirm, cancel, refund.

use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};

use faregate_auth::AuthenticatedIdentity;
use faregate_booking::{CancelBooking, ConfirmBooking, RefundBooking};
use faregate_core::{BookingId, PaymentId, UserId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::middleware::RequestCorrelation;

pub async fn book(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Json(body): Json<dto::BookTicketRequest>,
) -> axum::response::Response {
    let cmd = match body.into_command(&identity) {
        Ok(cmd) => cmd,
        Err(err) => return errors::domain_error_response(err),
    };

    match services
        .commands
        .book(cmd, correlation.to_correlation())
        .await
    {
        Ok(booking) => dto::success(
            StatusCode::CREATED,
            dto::booking_to_json(&booking),
            &correlation.0,
        ),
        Err(err) => errors::command_error_response(err),
    }
}

pub async fn reserve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Json(body): Json<dto::ReserveTicketRequest>,
) -> axum::response::Response {
    let cmd = match body.into_command(&identity) {
        Ok(cmd) => cmd,
        Err(err) => return errors::domain_error_response(err),
    };

    match services
        .commands
        .reserve(cmd, correlation.to_correlation())
        .await
    {
        Ok(booking) => dto::success(
            StatusCode::CREATED,
            dto::booking_to_json(&booking),
            &correlation.0,
        ),
        Err(err) => errors::command_error_response(err),
    }
}

pub async fn confirm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Json(body): Json<dto::ConfirmTicketRequest>,
) -> axum::response::Response {
    let booking_id: BookingId = match body.booking_id.parse() {
        Ok(id) => id,
        Err(err) => return errors::domain_error_response(err),
    };

    let cmd = ConfirmBooking {
        booking_id,
        payment_id: PaymentId::new(body.payment_id),
    };

    match services
        .commands
        .confirm(cmd, correlation.to_correlation())
        .await
    {
        Ok(booking) => dto::success(
            StatusCode::OK,
            dto::booking_to_json(&booking),
            &correlation.0,
        ),
        Err(err) => errors::command_error_response(err),
    }
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Json(body): Json<dto::CancelTicketRequest>,
) -> axum::response::Response {
    let booking_id: BookingId = match body.booking_id.parse() {
        Ok(id) => id,
        Err(err) => return errors::domain_error_response(err),
    };

    // Regular callers always cancel as themselves. Admin callers may act for
    // another user — or for no user at all (peer-service saga compensation).
    let requested_by = if identity.is_admin() {
        body.user_id.map(UserId::new)
    } else {
        Some(identity.user_id.clone())
    };

    let cmd = CancelBooking {
        booking_id,
        requested_by,
        reason: body.reason,
    };

    match services
        .commands
        .cancel(cmd, correlation.to_correlation())
        .await
    {
        Ok(booking) => dto::success(
            StatusCode::OK,
            dto::booking_to_json(&booking),
            &correlation.0,
        ),
        Err(err) => errors::command_error_response(err),
    }
}

pub async fn refund(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<AuthenticatedIdentity>,
    Extension(correlation): Extension<RequestCorrelation>,
    Json(body): Json<dto::RefundTicketRequest>,
) -> axum::response::Response {
    if !identity.is_admin() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "refunds are a service-to-service operation",
        );
    }

    let booking_id: BookingId = match body.booking_id.parse() {
        Ok(id) => id,
        Err(err) => return errors::domain_error_response(err),
    };

    match services
        .commands
        .refund(RefundBooking { booking_id }, correlation.to_correlation())
        .await
    {
        Ok(booking) => dto::success(
            StatusCode::OK,
            dto::booking_to_json(&booking),
            &correlation.0,
        ),
        Err(err) => errors::command_error_response(err),
    }
}
