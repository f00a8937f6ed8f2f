//! In-memory write store with the same semantics as the Postgres
//! implementation (including the `(aggregate_id, version)` write fence).
//! Used by unit and integration tests; not wired in production.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use faregate_booking::{Booking, SeatAvailability, SeatTransition};
use faregate_core::{BookingId, ScheduleId};

use super::{
    Correlation, DecideFn, EventRecord, TransitionOutcome, WriteStore, WriteStoreError,
};

#[derive(Default)]
struct Inner {
    bookings: HashMap<BookingId, Booking>,
    events: Vec<EventRecord>,
    seats: HashMap<(ScheduleId, String), SeatAvailability>,
}

#[derive(Default)]
pub struct InMemoryWriteStore {
    inner: Mutex<Inner>,
}

impl InMemoryWriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All event rows, in append order. Test inspection helper.
    pub fn all_events(&self) -> Vec<EventRecord> {
        self.inner.lock().unwrap().events.clone()
    }

    /// Rewind a reservation's deadline, simulating elapsed wall-clock time.
    /// Test clock control only; not a lifecycle transition.
    pub fn force_expires_at(&self, booking_id: BookingId, at: DateTime<Utc>) {
        if let Some(booking) = self.inner.lock().unwrap().bookings.get_mut(&booking_id) {
            booking.expires_at = Some(at);
        }
    }

    /// Number of event rows for one aggregate. Test inspection helper.
    pub fn event_count(&self, booking_id: BookingId) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.aggregate_id == booking_id)
            .count() as u64
    }
}

impl Inner {
    fn apply_seat(
        &mut self,
        seat: &SeatTransition,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<(), WriteStoreError> {
        let key = (seat.schedule_id.clone(), seat.seat_number.clone());
        let availability = self.seats.entry(key).or_insert_with(|| {
            SeatAvailability::available(seat.schedule_id.clone(), seat.seat_number.clone())
        });
        availability
            .apply(&seat.kind, booking_id, now)
            .map_err(WriteStoreError::Rejected)
    }

    fn fence(&self, record: &EventRecord) -> Result<(), WriteStoreError> {
        if self
            .events
            .iter()
            .any(|e| e.aggregate_id == record.aggregate_id && e.version == record.version)
        {
            return Err(WriteStoreError::VersionConflict(format!(
                "version {} already exists for aggregate {}",
                record.version, record.aggregate_id
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl WriteStore for InMemoryWriteStore {
    async fn create(
        &self,
        booking: &Booking,
        seat: Option<&SeatTransition>,
        record: &EventRecord,
        now: DateTime<Utc>,
    ) -> Result<(), WriteStoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.fence(record)?;

        // A rejected acquisition leaves the row untouched (or freshly
        // materialized as AVAILABLE, matching the Postgres behavior).
        if let Some(seat) = seat {
            inner.apply_seat(seat, booking.id, now)?;
        }

        inner.bookings.insert(booking.id, booking.clone());
        inner.events.push(record.clone());
        Ok(())
    }

    async fn update(
        &self,
        booking_id: BookingId,
        now: DateTime<Utc>,
        decide: DecideFn,
        correlation: &Correlation,
    ) -> Result<TransitionOutcome, WriteStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let booking = inner
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(WriteStoreError::NotFound)?;

        let decision = decide(&booking).map_err(WriteStoreError::Rejected)?;

        let mut post = booking;
        post.apply(&decision.event);
        let record = EventRecord::from_event(&decision.event, post.version, correlation);
        inner.fence(&record)?;

        if let Some(seat) = &decision.seat {
            inner.apply_seat(seat, post.id, now)?;
        }

        inner.bookings.insert(post.id, post.clone());
        inner.events.push(record.clone());

        Ok(TransitionOutcome {
            booking: post,
            record,
        })
    }

    async fn load(&self, booking_id: BookingId) -> Result<Option<Booking>, WriteStoreError> {
        Ok(self.inner.lock().unwrap().bookings.get(&booking_id).cloned())
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BookingId>, WriteStoreError> {
        let inner = self.inner.lock().unwrap();
        let mut overdue: Vec<&Booking> = inner
            .bookings
            .values()
            .filter(|b| {
                b.status == faregate_booking::BookingStatus::Reserved
                    && b.expires_at.is_some_and(|at| at < now)
            })
            .collect();
        overdue.sort_by_key(|b| b.expires_at);
        Ok(overdue
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|b| b.id)
            .collect())
    }

    async fn events_after(
        &self,
        booking_id: BookingId,
        after_version: u64,
    ) -> Result<Vec<EventRecord>, WriteStoreError> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<EventRecord> = inner
            .events
            .iter()
            .filter(|e| e.aggregate_id == booking_id && e.version > after_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn seat(
        &self,
        schedule_id: &ScheduleId,
        seat_number: &str,
    ) -> Result<Option<SeatAvailability>, WriteStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .seats
            .get(&(schedule_id.clone(), seat_number.to_string()))
            .cloned())
    }
}
