//! Booking aggregate root and its lifecycle state machine.
//!
//! States: PENDING, RESERVED, CONFIRMED, CANCELLED, EXPIRED, REFUNDED.
//! Legal transitions:
//!
//! - PENDING   → CONFIRMED (confirm), CANCELLED (cancel)
//! - RESERVED  → CONFIRMED (confirm, only before expiry), CANCELLED (cancel),
//!               EXPIRED (sweeper)
//! - CONFIRMED → CANCELLED (cancel), REFUNDED (service-to-service)
//! - CANCELLED, EXPIRED, REFUNDED are terminal.
//!
//! Every decided transition produces exactly one event; `apply` bumps the
//! version by one, so the event count for an aggregate always equals its
//! version.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use faregate_core::{
    BookingId, Currency, DomainError, DomainResult, Money, PaymentId, RouteId, ScheduleId, UserId,
};

use crate::events::{
    TicketBooked, TicketCancelled, TicketConfirmed, TicketEvent, TicketExpired, TicketRefunded,
    TicketReserved,
};
use crate::seat::{SeatTransition, SeatTransitionKind};

pub const DEFAULT_RESERVATION_MINUTES: i64 = 15;
pub const MIN_RESERVATION_MINUTES: i64 = 5;
pub const MAX_RESERVATION_MINUTES: i64 = 60;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Reserved,
    Confirmed,
    Cancelled,
    Expired,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Reserved => "RESERVED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "RESERVED" => Ok(BookingStatus::Reserved),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "EXPIRED" => Ok(BookingStatus::Expired),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            other => Err(DomainError::bad_request(format!(
                "unknown booking status {other:?}"
            ))),
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Expired | BookingStatus::Refunded
        )
    }
}

impl core::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDetails {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl PassengerDetails {
    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::bad_request("passenger name is required"));
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(DomainError::bad_request(
                "a valid passenger email is required",
            ));
        }
        Ok(())
    }
}

/// Command: create a booking in PENDING (direct purchase).
#[derive(Debug, Clone, PartialEq)]
pub struct BookTicket {
    pub user_id: UserId,
    pub route_id: RouteId,
    pub schedule_id: ScheduleId,
    pub seat_number: Option<String>,
    pub passenger: PassengerDetails,
    pub price: Money,
    pub currency: Currency,
}

/// Command: create a booking in RESERVED with an expiry deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct ReserveTicket {
    pub user_id: UserId,
    pub route_id: RouteId,
    pub schedule_id: ScheduleId,
    pub seat_number: Option<String>,
    pub passenger: PassengerDetails,
    pub price: Money,
    pub currency: Currency,
    pub duration_minutes: i64,
}

/// Command: attach a payment and confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmBooking {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
}

/// Command: cancel a booking.
///
/// `requested_by` is enforced when present; service-to-service callers may
/// omit it (the transport requires an admin capability for that).
#[derive(Debug, Clone, PartialEq)]
pub struct CancelBooking {
    pub booking_id: BookingId,
    pub requested_by: Option<UserId>,
    pub reason: Option<String>,
}

/// Command: mark a confirmed booking refunded (out-of-band settlement).
#[derive(Debug, Clone, PartialEq)]
pub struct RefundBooking {
    pub booking_id: BookingId,
}

/// Outcome of deciding a command: the single event to persist plus the seat
/// mutation (if the booking holds a seat) to apply in the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub event: TicketEvent,
    pub seat: Option<SeatTransition>,
}

/// Placeholder refund rule: full price iff the booking was CONFIRMED when the
/// cancellation happened, nothing otherwise.
pub fn refund_for_cancellation(status: BookingStatus, price: Money) -> Option<Money> {
    match status {
        BookingStatus::Confirmed => Some(price),
        _ => None,
    }
}

/// The aggregate root. The persisted `bookings` row is this struct's latest
/// state, kept in lockstep with the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub route_id: RouteId,
    pub schedule_id: ScheduleId,
    pub seat_number: Option<String>,
    pub passenger_name: String,
    pub passenger_email: String,
    pub passenger_phone: Option<String>,
    pub price: Money,
    pub currency: Currency,
    pub status: BookingStatus,
    pub payment_id: Option<PaymentId>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Booking {
    /// Decide a `BookTicket` command. The returned event is the aggregate's
    /// genesis; feed it to [`Booking::genesis`] for the initial state.
    pub fn decide_book(id: BookingId, cmd: &BookTicket, now: DateTime<Utc>) -> DomainResult<Decision> {
        cmd.passenger.validate()?;
        if !cmd.price.is_positive() {
            return Err(DomainError::bad_request("price must be positive"));
        }

        let event = TicketEvent::Booked(TicketBooked {
            booking_id: id,
            user_id: cmd.user_id.clone(),
            route_id: cmd.route_id.clone(),
            schedule_id: cmd.schedule_id.clone(),
            seat_number: cmd.seat_number.clone(),
            passenger_name: cmd.passenger.name.clone(),
            passenger_email: cmd.passenger.email.clone(),
            passenger_phone: cmd.passenger.phone.clone(),
            price: cmd.price,
            currency: cmd.currency.clone(),
            occurred_at: now,
        });

        let seat = cmd.seat_number.as_ref().map(|seat_number| SeatTransition {
            schedule_id: cmd.schedule_id.clone(),
            seat_number: seat_number.clone(),
            kind: SeatTransitionKind::Book,
        });

        Ok(Decision { event, seat })
    }

    /// Decide a `ReserveTicket` command.
    pub fn decide_reserve(
        id: BookingId,
        cmd: &ReserveTicket,
        now: DateTime<Utc>,
    ) -> DomainResult<Decision> {
        cmd.passenger.validate()?;
        if !cmd.price.is_positive() {
            return Err(DomainError::bad_request("price must be positive"));
        }
        if !(MIN_RESERVATION_MINUTES..=MAX_RESERVATION_MINUTES).contains(&cmd.duration_minutes) {
            return Err(DomainError::bad_request(format!(
                "reservation duration must be between {MIN_RESERVATION_MINUTES} and \
                 {MAX_RESERVATION_MINUTES} minutes"
            )));
        }

        let expires_at = now + Duration::minutes(cmd.duration_minutes);

        let event = TicketEvent::Reserved(TicketReserved {
            booking_id: id,
            user_id: cmd.user_id.clone(),
            route_id: cmd.route_id.clone(),
            schedule_id: cmd.schedule_id.clone(),
            seat_number: cmd.seat_number.clone(),
            passenger_name: cmd.passenger.name.clone(),
            passenger_email: cmd.passenger.email.clone(),
            passenger_phone: cmd.passenger.phone.clone(),
            price: cmd.price,
            currency: cmd.currency.clone(),
            expires_at,
            occurred_at: now,
        });

        let seat = cmd.seat_number.as_ref().map(|seat_number| SeatTransition {
            schedule_id: cmd.schedule_id.clone(),
            seat_number: seat_number.clone(),
            kind: SeatTransitionKind::Lock { until: expires_at },
        });

        Ok(Decision { event, seat })
    }

    /// Decide `ConfirmBooking` against the current state.
    pub fn handle_confirm(&self, cmd: &ConfirmBooking, now: DateTime<Utc>) -> DomainResult<Decision> {
        match self.status {
            BookingStatus::Pending | BookingStatus::Reserved => {}
            other => {
                return Err(DomainError::invalid_state(
                    other.as_str(),
                    "only pending or reserved bookings can be confirmed",
                ))
            }
        }

        if self.status == BookingStatus::Reserved {
            match self.expires_at {
                Some(expires_at) if expires_at >= now => {}
                _ => {
                    return Err(DomainError::invalid_state(
                        self.status.as_str(),
                        "reservation expired",
                    ))
                }
            }
        }

        let event = TicketEvent::Confirmed(TicketConfirmed {
            booking_id: self.id,
            user_id: self.user_id.clone(),
            payment_id: cmd.payment_id.clone(),
            confirmed_at: now,
        });

        // A PENDING booking already holds its seat as BOOKED; only a held
        // lock needs promotion.
        let seat = if self.status == BookingStatus::Reserved {
            self.seat_transition(SeatTransitionKind::ConfirmLock)
        } else {
            None
        };

        Ok(Decision { event, seat })
    }

    /// Decide `CancelBooking` against the current state.
    pub fn handle_cancel(&self, cmd: &CancelBooking, now: DateTime<Utc>) -> DomainResult<Decision> {
        if let Some(requester) = &cmd.requested_by {
            if requester != &self.user_id {
                return Err(DomainError::forbidden(
                    "booking belongs to a different user",
                ));
            }
        }

        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(
                self.status.as_str(),
                "booking is already settled",
            ));
        }

        let event = TicketEvent::Cancelled(TicketCancelled {
            booking_id: self.id,
            user_id: self.user_id.clone(),
            reason: cmd.reason.clone(),
            cancelled_at: now,
            refund_amount: refund_for_cancellation(self.status, self.price),
        });

        Ok(Decision {
            event,
            seat: self.seat_transition(SeatTransitionKind::Release),
        })
    }

    /// Decide expiry (sweeper path). Fails when the booking is no longer an
    /// overdue reservation; the sweeper treats that as a benign race.
    pub fn handle_expire(&self, now: DateTime<Utc>) -> DomainResult<Decision> {
        if self.status != BookingStatus::Reserved {
            return Err(DomainError::invalid_state(
                self.status.as_str(),
                "only reserved bookings expire",
            ));
        }
        match self.expires_at {
            Some(expires_at) if expires_at < now => {}
            _ => {
                return Err(DomainError::invalid_state(
                    self.status.as_str(),
                    "reservation has not expired yet",
                ))
            }
        }

        let event = TicketEvent::Expired(TicketExpired {
            booking_id: self.id,
            user_id: self.user_id.clone(),
            expired_at: now,
        });

        Ok(Decision {
            event,
            seat: self.seat_transition(SeatTransitionKind::Release),
        })
    }

    /// Decide a refund (service-to-service settlement of a confirmed booking).
    pub fn handle_refund(&self, now: DateTime<Utc>) -> DomainResult<Decision> {
        if self.status != BookingStatus::Confirmed {
            return Err(DomainError::invalid_state(
                self.status.as_str(),
                "only confirmed bookings can be refunded",
            ));
        }

        let event = TicketEvent::Refunded(TicketRefunded {
            booking_id: self.id,
            user_id: self.user_id.clone(),
            refund_amount: self.price,
            refunded_at: now,
        });

        Ok(Decision {
            event,
            seat: self.seat_transition(SeatTransitionKind::Release),
        })
    }

    fn seat_transition(&self, kind: SeatTransitionKind) -> Option<SeatTransition> {
        self.seat_number.as_ref().map(|seat_number| SeatTransition {
            schedule_id: self.schedule_id.clone(),
            seat_number: seat_number.clone(),
            kind,
        })
    }

    /// Build the initial aggregate state (version 1) from a creation event.
    pub fn genesis(event: &TicketEvent) -> DomainResult<Booking> {
        match event {
            TicketEvent::Booked(e) => Ok(Booking {
                id: e.booking_id,
                user_id: e.user_id.clone(),
                route_id: e.route_id.clone(),
                schedule_id: e.schedule_id.clone(),
                seat_number: e.seat_number.clone(),
                passenger_name: e.passenger_name.clone(),
                passenger_email: e.passenger_email.clone(),
                passenger_phone: e.passenger_phone.clone(),
                price: e.price,
                currency: e.currency.clone(),
                status: BookingStatus::Pending,
                payment_id: None,
                reserved_at: None,
                confirmed_at: None,
                cancelled_at: None,
                expires_at: None,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
                version: 1,
            }),
            TicketEvent::Reserved(e) => Ok(Booking {
                id: e.booking_id,
                user_id: e.user_id.clone(),
                route_id: e.route_id.clone(),
                schedule_id: e.schedule_id.clone(),
                seat_number: e.seat_number.clone(),
                passenger_name: e.passenger_name.clone(),
                passenger_email: e.passenger_email.clone(),
                passenger_phone: e.passenger_phone.clone(),
                price: e.price,
                currency: e.currency.clone(),
                status: BookingStatus::Reserved,
                payment_id: None,
                reserved_at: Some(e.occurred_at),
                confirmed_at: None,
                cancelled_at: None,
                expires_at: Some(e.expires_at),
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
                version: 1,
            }),
            other => Err(DomainError::bad_request(format!(
                "{} cannot start an aggregate stream",
                faregate_events::Event::event_type(other)
            ))),
        }
    }

    /// Apply a transition event, advancing the version by one.
    pub fn apply(&mut self, event: &TicketEvent) {
        match event {
            // Creation events seed the aggregate via `genesis`.
            TicketEvent::Booked(_) | TicketEvent::Reserved(_) => return,
            TicketEvent::Confirmed(e) => {
                self.status = BookingStatus::Confirmed;
                self.payment_id = Some(e.payment_id.clone());
                self.confirmed_at = Some(e.confirmed_at);
                self.expires_at = None;
                self.updated_at = e.confirmed_at;
            }
            TicketEvent::Cancelled(e) => {
                self.status = BookingStatus::Cancelled;
                self.cancelled_at = Some(e.cancelled_at);
                self.expires_at = None;
                self.updated_at = e.cancelled_at;
            }
            TicketEvent::Expired(e) => {
                self.status = BookingStatus::Expired;
                self.expires_at = None;
                self.updated_at = e.expired_at;
            }
            TicketEvent::Refunded(e) => {
                self.status = BookingStatus::Refunded;
                self.updated_at = e.refunded_at;
            }
        }
        self.version += 1;
    }

    /// Rebuild an aggregate from its full event stream, in version order.
    pub fn rehydrate<'a>(events: impl IntoIterator<Item = &'a TicketEvent>) -> DomainResult<Booking> {
        let mut iter = events.into_iter();
        let first = iter.next().ok_or(DomainError::NotFound)?;
        let mut booking = Booking::genesis(first)?;
        for event in iter {
            booking.apply(event);
        }
        Ok(booking)
    }
}
