//! Typed domain events for the Booking aggregate.
//!
//! Payloads use the platform's camelCase wire names; the envelope in
//! `faregate-events` carries identity, version, and tracing metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use faregate_core::{BookingId, Currency, Money, PaymentId, RouteId, ScheduleId, UserId};
use faregate_events::Event;

/// `aggregateType` carried on every envelope produced here.
pub const AGGREGATE_TYPE: &str = "Booking";

/// Event: a booking was created in PENDING (direct purchase path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketBooked {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub route_id: RouteId,
    pub schedule_id: ScheduleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    pub passenger_name: String,
    pub passenger_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_phone: Option<String>,
    pub price: Money,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a booking was created in RESERVED with an expiry deadline
/// (payment-saga path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReserved {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub route_id: RouteId,
    pub schedule_id: ScheduleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    pub passenger_name: String,
    pub passenger_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_phone: Option<String>,
    pub price: Money,
    pub currency: Currency,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: payment completed, booking confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketConfirmed {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub payment_id: PaymentId,
    pub confirmed_at: DateTime<Utc>,
}

/// Event: booking cancelled by the user or a peer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCancelled {
    pub booking_id: BookingId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Money>,
}

/// Event: a reservation lapsed past its deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketExpired {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub expired_at: DateTime<Utc>,
}

/// Event: a confirmed booking was refunded (service-to-service path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRefunded {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub refund_amount: Money,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TicketEvent {
    Booked(TicketBooked),
    Reserved(TicketReserved),
    Confirmed(TicketConfirmed),
    Cancelled(TicketCancelled),
    Expired(TicketExpired),
    Refunded(TicketRefunded),
}

impl TicketEvent {
    pub fn booking_id(&self) -> BookingId {
        match self {
            TicketEvent::Booked(e) => e.booking_id,
            TicketEvent::Reserved(e) => e.booking_id,
            TicketEvent::Confirmed(e) => e.booking_id,
            TicketEvent::Cancelled(e) => e.booking_id,
            TicketEvent::Expired(e) => e.booking_id,
            TicketEvent::Refunded(e) => e.booking_id,
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            TicketEvent::Booked(e) => &e.user_id,
            TicketEvent::Reserved(e) => &e.user_id,
            TicketEvent::Confirmed(e) => &e.user_id,
            TicketEvent::Cancelled(e) => &e.user_id,
            TicketEvent::Expired(e) => &e.user_id,
            TicketEvent::Refunded(e) => &e.user_id,
        }
    }

    /// Serialize just the payload (what goes into the envelope's `payload`).
    pub fn payload_json(&self) -> JsonValue {
        let result = match self {
            TicketEvent::Booked(e) => serde_json::to_value(e),
            TicketEvent::Reserved(e) => serde_json::to_value(e),
            TicketEvent::Confirmed(e) => serde_json::to_value(e),
            TicketEvent::Cancelled(e) => serde_json::to_value(e),
            TicketEvent::Expired(e) => serde_json::to_value(e),
            TicketEvent::Refunded(e) => serde_json::to_value(e),
        };
        // Payload structs contain only serializable field types.
        result.unwrap_or(JsonValue::Null)
    }

    /// Reconstruct a typed event from a wire `eventType` + payload.
    ///
    /// Returns `Ok(None)` for unknown event types so consumers can skip them
    /// (warn only, per the projector contract).
    pub fn from_wire(event_type: &str, payload: &JsonValue) -> Result<Option<Self>, serde_json::Error> {
        let event = match event_type {
            "TICKET_BOOKED" => Some(TicketEvent::Booked(serde_json::from_value(payload.clone())?)),
            "TICKET_RESERVED" => {
                Some(TicketEvent::Reserved(serde_json::from_value(payload.clone())?))
            }
            "TICKET_CONFIRMED" => {
                Some(TicketEvent::Confirmed(serde_json::from_value(payload.clone())?))
            }
            "TICKET_CANCELLED" => {
                Some(TicketEvent::Cancelled(serde_json::from_value(payload.clone())?))
            }
            "TICKET_EXPIRED" => Some(TicketEvent::Expired(serde_json::from_value(payload.clone())?)),
            "TICKET_REFUNDED" => {
                Some(TicketEvent::Refunded(serde_json::from_value(payload.clone())?))
            }
            _ => None,
        };
        Ok(event)
    }
}

impl Event for TicketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TicketEvent::Booked(_) => "TICKET_BOOKED",
            TicketEvent::Reserved(_) => "TICKET_RESERVED",
            TicketEvent::Confirmed(_) => "TICKET_CONFIRMED",
            TicketEvent::Cancelled(_) => "TICKET_CANCELLED",
            TicketEvent::Expired(_) => "TICKET_EXPIRED",
            TicketEvent::Refunded(_) => "TICKET_REFUNDED",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TicketEvent::Booked(e) => e.occurred_at,
            TicketEvent::Reserved(e) => e.occurred_at,
            TicketEvent::Confirmed(e) => e.confirmed_at,
            TicketEvent::Cancelled(e) => e.cancelled_at,
            TicketEvent::Expired(e) => e.expired_at,
            TicketEvent::Refunded(e) => e.refunded_at,
        }
    }
}
