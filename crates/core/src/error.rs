//! Domain error model.
//!
//! These are **business-rule failures**: deterministic, actionable, and mapped
//! one-to-one onto the wire error codes at the API boundary. Infrastructure
//! failures (connection loss, broker down) live in the infra crate's error
//! types and are never folded into this enum.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure.
///
/// Kept `Clone + PartialEq` so tests can assert on exact error values and so
/// errors can cross task boundaries without boxing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field is missing or a field value is out of range.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No usable credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but not the owner of the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The booking (or ticket) does not exist.
    #[error("booking not found")]
    NotFound,

    /// The requested seat is not acquirable.
    #[error("insufficient seats: {0}")]
    InsufficientSeats(String),

    /// The requested transition is illegal from the booking's current status.
    #[error("invalid booking state ({current}): {reason}")]
    InvalidBookingState { current: String, reason: String },
}

impl DomainError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn insufficient_seats(msg: impl Into<String>) -> Self {
        Self::InsufficientSeats(msg.into())
    }

    pub fn invalid_state(current: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBookingState {
            current: current.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::InsufficientSeats(_) => "INSUFFICIENT_SEATS",
            Self::InvalidBookingState { .. } => "INVALID_BOOKING_STATE",
        }
    }
}
