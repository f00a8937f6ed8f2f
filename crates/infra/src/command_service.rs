//! The command core: validates commands, mutates the aggregate under one
//! write-store transaction, and publishes the committed event on the bus.
//!
//! Publication happens strictly after commit and is best-effort ("commit
//! wins"): the event store is the source of truth, the projector is
//! idempotent, and `WriteStore::events_after` lets a reconciler replay
//! anything that never reached the bus.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use faregate_booking::{
    BookTicket, Booking, CancelBooking, ConfirmBooking, RefundBooking, ReserveTicket,
};
use faregate_core::{BookingId, DomainError};

use crate::bus::EventPublisher;
use crate::write_store::{Correlation, EventRecord, WriteStore, WriteStoreError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Lost the write fence to a concurrent transaction; safe to retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<WriteStoreError> for CommandError {
    fn from(value: WriteStoreError) -> Self {
        match value {
            WriteStoreError::NotFound => CommandError::Domain(DomainError::NotFound),
            WriteStoreError::Rejected(err) => CommandError::Domain(err),
            WriteStoreError::VersionConflict(msg) => CommandError::Conflict(msg),
            WriteStoreError::Unavailable(msg) => CommandError::Unavailable(msg),
        }
    }
}

pub struct CommandService {
    store: Arc<dyn WriteStore>,
    bus: Arc<dyn EventPublisher>,
}

impl CommandService {
    pub fn new(store: Arc<dyn WriteStore>, bus: Arc<dyn EventPublisher>) -> Self {
        Self { store, bus }
    }

    /// Book: create a PENDING booking, claiming the seat (AVAILABLE → BOOKED)
    /// when one was requested.
    pub async fn book(
        &self,
        cmd: BookTicket,
        correlation: Correlation,
    ) -> Result<Booking, CommandError> {
        let now = Utc::now();
        let id = BookingId::new();
        let decision = Booking::decide_book(id, &cmd, now)?;
        let booking = Booking::genesis(&decision.event)?;
        let record = EventRecord::from_event(&decision.event, booking.version, &correlation);

        self.store
            .create(&booking, decision.seat.as_ref(), &record, now)
            .await?;

        info!(booking_id = %booking.id, status = %booking.status, "booking created");
        self.publish(&record).await;
        Ok(booking)
    }

    /// Reserve: create a RESERVED booking with an expiry deadline, locking
    /// the seat until that deadline.
    pub async fn reserve(
        &self,
        cmd: ReserveTicket,
        correlation: Correlation,
    ) -> Result<Booking, CommandError> {
        let now = Utc::now();
        let id = BookingId::new();
        let decision = Booking::decide_reserve(id, &cmd, now)?;
        let booking = Booking::genesis(&decision.event)?;
        let record = EventRecord::from_event(&decision.event, booking.version, &correlation);

        self.store
            .create(&booking, decision.seat.as_ref(), &record, now)
            .await?;

        info!(
            booking_id = %booking.id,
            expires_at = ?booking.expires_at,
            "reservation created"
        );
        self.publish(&record).await;
        Ok(booking)
    }

    /// Confirm: attach the payment and move to CONFIRMED (held seat lock
    /// becomes BOOKED).
    pub async fn confirm(
        &self,
        cmd: ConfirmBooking,
        correlation: Correlation,
    ) -> Result<Booking, CommandError> {
        let now = Utc::now();
        let booking_id = cmd.booking_id;
        let outcome = self
            .store
            .update(
                booking_id,
                now,
                Box::new(move |booking| booking.handle_confirm(&cmd, now)),
                &correlation,
            )
            .await?;

        info!(booking_id = %outcome.booking.id, "booking confirmed");
        self.publish(&outcome.record).await;
        Ok(outcome.booking)
    }

    /// Cancel: move to CANCELLED and free the seat. Ownership is enforced
    /// when the command names a requesting user.
    pub async fn cancel(
        &self,
        cmd: CancelBooking,
        correlation: Correlation,
    ) -> Result<Booking, CommandError> {
        let now = Utc::now();
        let booking_id = cmd.booking_id;
        let outcome = self
            .store
            .update(
                booking_id,
                now,
                Box::new(move |booking| booking.handle_cancel(&cmd, now)),
                &correlation,
            )
            .await?;

        info!(booking_id = %outcome.booking.id, "booking cancelled");
        self.publish(&outcome.record).await;
        Ok(outcome.booking)
    }

    /// Refund a confirmed booking (service-to-service settlement).
    pub async fn refund(
        &self,
        cmd: RefundBooking,
        correlation: Correlation,
    ) -> Result<Booking, CommandError> {
        let now = Utc::now();
        let outcome = self
            .store
            .update(
                cmd.booking_id,
                now,
                Box::new(move |booking| booking.handle_refund(now)),
                &correlation,
            )
            .await?;

        info!(booking_id = %outcome.booking.id, "booking refunded");
        self.publish(&outcome.record).await;
        Ok(outcome.booking)
    }

    /// Expire one overdue reservation (sweeper path).
    ///
    /// Returns `Ok(None)` when the booking is gone or no longer an overdue
    /// reservation — a concurrent confirm or cancel winning the row lock
    /// first is expected, not an error.
    pub async fn expire(
        &self,
        booking_id: BookingId,
        now: DateTime<Utc>,
        correlation: Correlation,
    ) -> Result<Option<Booking>, CommandError> {
        let result = self
            .store
            .update(
                booking_id,
                now,
                Box::new(move |booking| booking.handle_expire(now)),
                &correlation,
            )
            .await;

        match result {
            Ok(outcome) => {
                info!(booking_id = %outcome.booking.id, "reservation expired");
                self.publish(&outcome.record).await;
                Ok(Some(outcome.booking))
            }
            Err(WriteStoreError::NotFound)
            | Err(WriteStoreError::Rejected(DomainError::InvalidBookingState { .. })) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Publish after commit; failure is logged, never surfaced. The read
    /// model lags until the event is replayed.
    async fn publish(&self, record: &EventRecord) {
        if let Err(error) = self.bus.publish(&record.to_envelope()).await {
            warn!(
                aggregate_id = %record.aggregate_id,
                event_type = %record.event_type,
                %error,
                "event publish failed after commit; read model will lag"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use faregate_booking::{BookingStatus, PassengerDetails, SeatStatus};
    use faregate_core::{Currency, Money, PaymentId, RouteId, ScheduleId, UserId};

    use crate::bus::InMemoryEventBus;
    use crate::write_store::InMemoryWriteStore;

    struct Fixture {
        service: CommandService,
        store: Arc<InMemoryWriteStore>,
        bus: Arc<InMemoryEventBus>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryWriteStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        Fixture {
            service: CommandService::new(store.clone(), bus.clone()),
            store,
            bus,
        }
    }

    fn book_cmd(seat: Option<&str>) -> BookTicket {
        BookTicket {
            user_id: UserId::from("U1"),
            route_id: RouteId::from("R1"),
            schedule_id: ScheduleId::from("S1"),
            seat_number: seat.map(str::to_string),
            passenger: PassengerDetails {
                name: "Ada Passenger".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            price: Money::new(dec!(25.00)),
            currency: Currency::usd(),
        }
    }

    fn reserve_cmd(seat: Option<&str>, minutes: i64) -> ReserveTicket {
        ReserveTicket {
            user_id: UserId::from("U1"),
            route_id: RouteId::from("R1"),
            schedule_id: ScheduleId::from("S1"),
            seat_number: seat.map(str::to_string),
            passenger: PassengerDetails {
                name: "Ada Passenger".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            price: Money::new(dec!(25.00)),
            currency: Currency::usd(),
            duration_minutes: minutes,
        }
    }

    #[tokio::test]
    async fn book_persists_booking_seat_and_event_and_publishes() {
        let f = fixture();
        let booking = f
            .service
            .book(book_cmd(Some("A1")), Correlation::with_id("corr-1"))
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.version, 1);

        let seat = f
            .store
            .seat(&ScheduleId::from("S1"), "A1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seat.status, SeatStatus::Booked);
        assert_eq!(seat.booking_id, Some(booking.id));

        assert_eq!(f.store.event_count(booking.id), 1);

        let published = f.bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "TICKET_BOOKED");
        assert_eq!(published[0].aggregate_id(), *booking.id.as_uuid());
        assert_eq!(published[0].version(), 1);
        assert_eq!(published[0].correlation_id(), Some("corr-1"));
    }

    #[tokio::test]
    async fn second_book_for_same_seat_conflicts() {
        let f = fixture();
        f.service
            .book(book_cmd(Some("B1")), Correlation::none())
            .await
            .unwrap();

        let err = f
            .service
            .book(book_cmd(Some("B1")), Correlation::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Domain(DomainError::InsufficientSeats(_))
        ));

        // The loser left no booking or event behind.
        assert_eq!(f.bus.published().len(), 1);
    }

    #[tokio::test]
    async fn reserve_then_confirm_books_the_seat() {
        let f = fixture();
        let booking = f
            .service
            .reserve(reserve_cmd(Some("A2"), 15), Correlation::none())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Reserved);

        let confirmed = f
            .service
            .confirm(
                ConfirmBooking {
                    booking_id: booking.id,
                    payment_id: PaymentId::from("P9"),
                },
                Correlation::none(),
            )
            .await
            .unwrap();

        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_id, Some(PaymentId::from("P9")));
        assert!(confirmed.expires_at.is_none());
        assert_eq!(confirmed.version, 2);

        let seat = f
            .store
            .seat(&ScheduleId::from("S1"), "A2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seat.status, SeatStatus::Booked);
        assert!(seat.locked_until.is_none());

        let types: Vec<String> = f
            .bus
            .published()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(types, ["TICKET_RESERVED", "TICKET_CONFIRMED"]);
    }

    #[tokio::test]
    async fn stale_reservation_seat_can_be_reacquired() {
        let f = fixture();
        let booking = f
            .service
            .reserve(reserve_cmd(Some("C1"), 5), Correlation::none())
            .await
            .unwrap();

        // Second reservation for the same seat while the lock is live.
        let err = f
            .service
            .reserve(reserve_cmd(Some("C1"), 5), Correlation::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Domain(DomainError::InsufficientSeats(_))
        ));

        // Expire the first reservation, then the seat frees up for others.
        let later = booking.expires_at.unwrap() + Duration::minutes(1);
        let expired = f
            .service
            .expire(booking.id, later, Correlation::none())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expired.status, BookingStatus::Expired);

        let seat = f
            .store
            .seat(&ScheduleId::from("S1"), "C1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seat.status, SeatStatus::Available);
        assert!(seat.booking_id.is_none());
    }

    #[tokio::test]
    async fn expire_is_benign_when_booking_was_confirmed_first() {
        let f = fixture();
        let booking = f
            .service
            .reserve(reserve_cmd(None, 5), Correlation::none())
            .await
            .unwrap();
        f.service
            .confirm(
                ConfirmBooking {
                    booking_id: booking.id,
                    payment_id: PaymentId::from("P1"),
                },
                Correlation::none(),
            )
            .await
            .unwrap();

        let later = booking.expires_at.unwrap() + Duration::minutes(1);
        let result = f
            .service
            .expire(booking.id, later, Correlation::none())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(f.store.event_count(booking.id), 2);
    }

    #[tokio::test]
    async fn cancel_confirmed_carries_full_refund() {
        let f = fixture();
        let booking = f
            .service
            .book(book_cmd(Some("D1")), Correlation::none())
            .await
            .unwrap();
        f.service
            .confirm(
                ConfirmBooking {
                    booking_id: booking.id,
                    payment_id: PaymentId::from("P2"),
                },
                Correlation::none(),
            )
            .await
            .unwrap();

        let cancelled = f
            .service
            .cancel(
                CancelBooking {
                    booking_id: booking.id,
                    requested_by: Some(UserId::from("U1")),
                    reason: Some("plans changed".to_string()),
                },
                Correlation::none(),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let seat = f
            .store
            .seat(&ScheduleId::from("S1"), "D1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seat.status, SeatStatus::Available);

        let published = f.bus.published();
        let cancelled_env = published.last().unwrap();
        assert_eq!(cancelled_env.event_type(), "TICKET_CANCELLED");
        assert_eq!(
            cancelled_env.payload().get("refundAmount").cloned(),
            Some(serde_json::json!("25.00"))
        );
    }

    #[tokio::test]
    async fn cancel_by_other_user_is_forbidden() {
        let f = fixture();
        let booking = f
            .service
            .book(book_cmd(None), Correlation::none())
            .await
            .unwrap();

        let err = f
            .service
            .cancel(
                CancelBooking {
                    booking_id: booking.id,
                    requested_by: Some(UserId::from("U2")),
                    reason: None,
                },
                Correlation::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Domain(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn confirm_missing_booking_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .confirm(
                ConfirmBooking {
                    booking_id: BookingId::new(),
                    payment_id: PaymentId::from("P1"),
                },
                Correlation::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Domain(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn event_count_matches_version_across_lifecycle() {
        let f = fixture();
        let booking = f
            .service
            .book(book_cmd(None), Correlation::none())
            .await
            .unwrap();
        let confirmed = f
            .service
            .confirm(
                ConfirmBooking {
                    booking_id: booking.id,
                    payment_id: PaymentId::from("P1"),
                },
                Correlation::none(),
            )
            .await
            .unwrap();
        let refunded = f
            .service
            .refund(
                RefundBooking {
                    booking_id: confirmed.id,
                },
                Correlation::none(),
            )
            .await
            .unwrap();

        assert_eq!(refunded.version, 3);
        assert_eq!(f.store.event_count(booking.id), refunded.version);
    }
}
