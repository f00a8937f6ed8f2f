//! Write-side storage port: bookings, their event stream, and seat
//! availability, mutated under one atomic boundary per command.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryWriteStore;
pub use postgres::PostgresWriteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use faregate_booking::{
    Booking, Decision, SeatAvailability, SeatTransition, TicketEvent, AGGREGATE_TYPE,
};
use faregate_core::{BookingId, DomainError, DomainResult, ScheduleId};
use faregate_events::{Event, EventEnvelope};

/// Tracing identifiers threaded from the transport into the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
}

impl Correlation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            causation_id: None,
        }
    }
}

/// One row of the append-only `booking_events` table.
///
/// `(aggregate_id, version)` is unique in storage; that index is the write
/// fence between concurrent transactions targeting the same booking.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: BookingId,
    pub aggregate_type: String,
    pub version: u64,
    pub payload: JsonValue,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn from_event(event: &TicketEvent, version: u64, correlation: &Correlation) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.booking_id(),
            aggregate_type: AGGREGATE_TYPE.to_string(),
            version,
            payload: event.payload_json(),
            correlation_id: correlation.correlation_id.clone(),
            causation_id: correlation.causation_id.clone(),
            created_at: event.occurred_at(),
        }
    }

    /// The envelope published on the bus for this record.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.event_type.clone(),
            *self.aggregate_id.as_uuid(),
            self.aggregate_type.clone(),
            self.created_at,
            self.version,
            self.correlation_id.clone(),
            self.causation_id.clone(),
            self.payload.clone(),
        )
    }
}

/// Decide callback run while the booking row lock is held.
pub type DecideFn = Box<dyn FnOnce(&Booking) -> DomainResult<Decision> + Send>;

/// Result of a persisted transition: the post-mutation aggregate and the
/// event row that was appended for it.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub booking: Booking,
    pub record: EventRecord,
}

#[derive(Debug, Error)]
pub enum WriteStoreError {
    #[error("booking not found")]
    NotFound,

    /// The decide step (or a seat acquisition) rejected the command.
    #[error("{0}")]
    Rejected(DomainError),

    /// Another transaction appended the same `(aggregate_id, version)` first.
    #[error("concurrent modification: {0}")]
    VersionConflict(String),

    #[error("write store unavailable: {0}")]
    Unavailable(String),
}

impl From<DomainError> for WriteStoreError {
    fn from(value: DomainError) -> Self {
        WriteStoreError::Rejected(value)
    }
}

/// Transactional storage of bookings, events, and seat availability.
///
/// Implementations must make each method one atomic unit: either the booking
/// mutation, the seat mutation, and the event append all become durable, or
/// none do.
#[async_trait]
pub trait WriteStore: Send + Sync {
    /// Persist a fresh aggregate (version 1), claiming its seat if the
    /// decision includes one.
    async fn create(
        &self,
        booking: &Booking,
        seat: Option<&SeatTransition>,
        record: &EventRecord,
        now: DateTime<Utc>,
    ) -> Result<(), WriteStoreError>;

    /// Lock the booking row, run `decide`, and persist the transition it
    /// yields (booking update + seat mutation + event append).
    async fn update(
        &self,
        booking_id: BookingId,
        now: DateTime<Utc>,
        decide: DecideFn,
        correlation: &Correlation,
    ) -> Result<TransitionOutcome, WriteStoreError>;

    async fn load(&self, booking_id: BookingId) -> Result<Option<Booking>, WriteStoreError>;

    /// Reservations whose deadline has passed, oldest first.
    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BookingId>, WriteStoreError>;

    /// Events for one aggregate with `version > after_version`, in version
    /// order. Replay hook for reconcilers and read-model rebuilds.
    async fn events_after(
        &self,
        booking_id: BookingId,
        after_version: u64,
    ) -> Result<Vec<EventRecord>, WriteStoreError>;

    async fn seat(
        &self,
        schedule_id: &ScheduleId,
        seat_number: &str,
    ) -> Result<Option<SeatAvailability>, WriteStoreError>;
}
