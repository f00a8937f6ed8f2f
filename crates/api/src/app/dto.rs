//! Request/response DTOs and their mapping onto domain commands.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use faregate_auth::AuthenticatedIdentity;
use faregate_booking::{
    BookTicket, Booking, PassengerDetails, ReserveTicket, DEFAULT_RESERVATION_MINUTES,
};
use faregate_core::{Currency, DomainResult, Money, RouteId, ScheduleId};
use faregate_infra::read_store::{TicketPage, TicketView};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicketRequest {
    pub route_id: String,
    pub schedule_id: String,
    pub seat_number: Option<String>,
    pub passenger_name: String,
    pub passenger_email: String,
    pub passenger_phone: Option<String>,
    pub price: Decimal,
    pub currency: Option<String>,
}

impl BookTicketRequest {
    pub fn into_command(self, identity: &AuthenticatedIdentity) -> DomainResult<BookTicket> {
        Ok(BookTicket {
            user_id: identity.user_id.clone(),
            route_id: RouteId::new(self.route_id),
            schedule_id: ScheduleId::new(self.schedule_id),
            seat_number: self.seat_number,
            passenger: PassengerDetails {
                name: self.passenger_name,
                email: self.passenger_email,
                phone: self.passenger_phone,
            },
            price: Money::new(self.price),
            currency: parse_currency(self.currency)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveTicketRequest {
    pub route_id: String,
    pub schedule_id: String,
    pub seat_number: Option<String>,
    pub passenger_name: String,
    pub passenger_email: String,
    pub passenger_phone: Option<String>,
    pub price: Decimal,
    pub currency: Option<String>,
    pub reservation_duration_minutes: Option<i64>,
}

impl ReserveTicketRequest {
    pub fn into_command(self, identity: &AuthenticatedIdentity) -> DomainResult<ReserveTicket> {
        Ok(ReserveTicket {
            user_id: identity.user_id.clone(),
            route_id: RouteId::new(self.route_id),
            schedule_id: ScheduleId::new(self.schedule_id),
            seat_number: self.seat_number,
            passenger: PassengerDetails {
                name: self.passenger_name,
                email: self.passenger_email,
                phone: self.passenger_phone,
            },
            price: Money::new(self.price),
            currency: parse_currency(self.currency)?,
            duration_minutes: self
                .reservation_duration_minutes
                .unwrap_or(DEFAULT_RESERVATION_MINUTES),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmTicketRequest {
    pub booking_id: String,
    pub payment_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTicketRequest {
    pub booking_id: String,
    pub reason: Option<String>,
    /// Admin-only override for service-to-service cancellations.
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundTicketRequest {
    pub booking_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTicketsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn parse_currency(code: Option<String>) -> DomainResult<Currency> {
    match code {
        Some(code) => Currency::parse(&code),
        None => Ok(Currency::usd()),
    }
}

// -------------------------
// Response envelopes
// -------------------------

pub fn success(
    status: StatusCode,
    data: JsonValue,
    correlation_id: &str,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": true,
            "data": data,
            "meta": { "correlationId": correlation_id },
        })),
    )
        .into_response()
}

pub fn booking_to_json(booking: &Booking) -> JsonValue {
    json!({
        "id": booking.id,
        "userId": booking.user_id,
        "routeId": booking.route_id,
        "scheduleId": booking.schedule_id,
        "seatNumber": booking.seat_number,
        "passengerName": booking.passenger_name,
        "passengerEmail": booking.passenger_email,
        "passengerPhone": booking.passenger_phone,
        "price": booking.price,
        "currency": booking.currency,
        "status": booking.status,
        "paymentId": booking.payment_id,
        "reservedAt": booking.reserved_at,
        "confirmedAt": booking.confirmed_at,
        "cancelledAt": booking.cancelled_at,
        "expiresAt": booking.expires_at,
        "createdAt": booking.created_at,
        "updatedAt": booking.updated_at,
        "version": booking.version,
    })
}

pub fn ticket_to_json(view: &TicketView) -> JsonValue {
    serde_json::to_value(view).unwrap_or(JsonValue::Null)
}

pub fn page_to_json(page: &TicketPage) -> JsonValue {
    json!({
        "data": page.data,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
        "totalPages": page.total_pages(),
    })
}
