//! The Booking aggregate: lifecycle state machine, commands, domain events,
//! and seat-availability transitions.
//!
//! Everything in this crate is pure and deterministic. Commands are decided
//! against a snapshot of the aggregate and produce exactly one event; applying
//! that event yields the next aggregate state and bumps the version by one.
//! Persistence, locking, and publication live in `faregate-infra`.

pub mod booking;
pub mod events;
pub mod seat;

pub use booking::{
    Booking, BookingStatus, BookTicket, CancelBooking, ConfirmBooking, Decision, PassengerDetails,
    RefundBooking, ReserveTicket, refund_for_cancellation, DEFAULT_RESERVATION_MINUTES,
    MAX_RESERVATION_MINUTES, MIN_RESERVATION_MINUTES,
};
pub use events::{
    TicketBooked, TicketCancelled, TicketConfirmed, TicketEvent, TicketExpired, TicketRefunded,
    TicketReserved, AGGREGATE_TYPE,
};
pub use seat::{SeatAvailability, SeatStatus, SeatTransition, SeatTransitionKind};
