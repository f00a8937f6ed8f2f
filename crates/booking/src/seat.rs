//! Seat-availability model.
//!
//! One row per `(schedule_id, seat_number)`. Transitions are driven solely by
//! the booking lifecycle; the stores hold the matching row under a lock while
//! applying them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use faregate_core::{BookingId, DomainError, DomainResult, ScheduleId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Locked,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Locked => "LOCKED",
            SeatStatus::Booked => "BOOKED",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "LOCKED" => Ok(SeatStatus::Locked),
            "BOOKED" => Ok(SeatStatus::Booked),
            other => Err(DomainError::bad_request(format!(
                "unknown seat status {other:?}"
            ))),
        }
    }
}

/// Current state of one physical seat on one schedule.
///
/// Invariants:
/// - LOCKED requires `locked_until` and `booking_id`.
/// - BOOKED requires `booking_id` and no `locked_until`.
/// - AVAILABLE carries neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub schedule_id: ScheduleId,
    pub seat_number: String,
    pub status: SeatStatus,
    pub booking_id: Option<BookingId>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl SeatAvailability {
    pub fn available(schedule_id: ScheduleId, seat_number: impl Into<String>) -> Self {
        Self {
            schedule_id,
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            booking_id: None,
            locked_until: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == SeatStatus::Available
    }

    /// A seat is acquirable for a reservation when it is AVAILABLE, or LOCKED
    /// with a deadline already in the past (the sweeper may not have fired
    /// yet; re-acquisition keeps the system progressing).
    pub fn is_acquirable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SeatStatus::Available => true,
            SeatStatus::Locked => self.locked_until.is_some_and(|until| until < now),
            SeatStatus::Booked => false,
        }
    }

    /// Apply a lifecycle transition for `booking_id` to this row.
    ///
    /// Acquisition transitions fail with `INSUFFICIENT_SEATS` when the row is
    /// not acquirable; release/confirm transitions always succeed (the caller
    /// holds the booking row lock, so ownership races cannot occur).
    pub fn apply(
        &mut self,
        kind: &SeatTransitionKind,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        match kind {
            SeatTransitionKind::Book => {
                if !self.is_available() {
                    return Err(DomainError::insufficient_seats(format!(
                        "seat {} on schedule {} is not available",
                        self.seat_number, self.schedule_id
                    )));
                }
                self.status = SeatStatus::Booked;
                self.booking_id = Some(booking_id);
                self.locked_until = None;
            }
            SeatTransitionKind::Lock { until } => {
                if !self.is_acquirable(now) {
                    return Err(DomainError::insufficient_seats(format!(
                        "seat {} on schedule {} is not available",
                        self.seat_number, self.schedule_id
                    )));
                }
                self.status = SeatStatus::Locked;
                self.booking_id = Some(booking_id);
                self.locked_until = Some(*until);
            }
            SeatTransitionKind::ConfirmLock => {
                self.status = SeatStatus::Booked;
                self.booking_id = Some(booking_id);
                self.locked_until = None;
            }
            SeatTransitionKind::Release => {
                self.status = SeatStatus::Available;
                self.booking_id = None;
                self.locked_until = None;
            }
        }
        Ok(())
    }
}

/// A seat mutation decided alongside a booking transition, applied under the
/// same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SeatTransition {
    pub schedule_id: ScheduleId,
    pub seat_number: String,
    pub kind: SeatTransitionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeatTransitionKind {
    /// AVAILABLE → BOOKED (direct purchase).
    Book,
    /// AVAILABLE (or stale LOCKED) → LOCKED until the reservation deadline.
    Lock { until: DateTime<Utc> },
    /// LOCKED → BOOKED on confirm.
    ConfirmLock,
    /// Back to AVAILABLE on cancel, expiry, or refund.
    Release,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seat() -> SeatAvailability {
        SeatAvailability::available(ScheduleId::from("S1"), "A1")
    }

    #[test]
    fn available_seat_can_be_booked() {
        let mut s = seat();
        let id = BookingId::new();
        s.apply(&SeatTransitionKind::Book, id, Utc::now()).unwrap();
        assert_eq!(s.status, SeatStatus::Booked);
        assert_eq!(s.booking_id, Some(id));
        assert!(s.locked_until.is_none());
    }

    #[test]
    fn booked_seat_cannot_be_booked_again() {
        let mut s = seat();
        s.apply(&SeatTransitionKind::Book, BookingId::new(), Utc::now())
            .unwrap();
        let err = s
            .apply(&SeatTransitionKind::Book, BookingId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientSeats(_)));
    }

    #[test]
    fn live_lock_blocks_acquisition() {
        let now = Utc::now();
        let mut s = seat();
        s.apply(
            &SeatTransitionKind::Lock {
                until: now + Duration::minutes(15),
            },
            BookingId::new(),
            now,
        )
        .unwrap();

        assert!(!s.is_acquirable(now));
        let err = s
            .apply(
                &SeatTransitionKind::Lock {
                    until: now + Duration::minutes(15),
                },
                BookingId::new(),
                now,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientSeats(_)));
    }

    #[test]
    fn stale_lock_can_be_reacquired() {
        let now = Utc::now();
        let mut s = seat();
        s.apply(
            &SeatTransitionKind::Lock {
                until: now - Duration::minutes(1),
            },
            BookingId::new(),
            now - Duration::minutes(20),
        )
        .unwrap();

        assert!(s.is_acquirable(now));
        let winner = BookingId::new();
        s.apply(
            &SeatTransitionKind::Lock {
                until: now + Duration::minutes(15),
            },
            winner,
            now,
        )
        .unwrap();
        assert_eq!(s.booking_id, Some(winner));
    }

    #[test]
    fn confirm_lock_books_and_clears_deadline() {
        let now = Utc::now();
        let id = BookingId::new();
        let mut s = seat();
        s.apply(
            &SeatTransitionKind::Lock {
                until: now + Duration::minutes(15),
            },
            id,
            now,
        )
        .unwrap();
        s.apply(&SeatTransitionKind::ConfirmLock, id, now).unwrap();
        assert_eq!(s.status, SeatStatus::Booked);
        assert!(s.locked_until.is_none());
    }

    #[test]
    fn release_returns_seat_to_available() {
        let now = Utc::now();
        let id = BookingId::new();
        let mut s = seat();
        s.apply(&SeatTransitionKind::Book, id, now).unwrap();
        s.apply(&SeatTransitionKind::Release, id, now).unwrap();
        assert_eq!(s, seat());
    }
}
