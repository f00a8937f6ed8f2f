//! In-memory read store mirroring the Postgres semantics (upsert keeps
//! enrichment fields, counters clamp at zero). Used by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use faregate_booking::BookingStatus;
use faregate_core::{BookingId, ScheduleId, UserId};

use super::{
    ProjectorCheckpoint, ReadStore, ReadStoreError, ScheduleAvailability, TicketPage, TicketView,
};

#[derive(Default)]
struct Inner {
    tickets: HashMap<BookingId, TicketView>,
    schedules: HashMap<ScheduleId, ScheduleAvailability>,
    checkpoints: HashMap<String, ProjectorCheckpoint>,
}

#[derive(Default)]
pub struct InMemoryReadStore {
    inner: Mutex<Inner>,
}

impl InMemoryReadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReadStore for InMemoryReadStore {
    async fn get_ticket(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<TicketView>, ReadStoreError> {
        Ok(self.inner.lock().unwrap().tickets.get(&booking_id).cloned())
    }

    async fn upsert_ticket(&self, view: &TicketView) -> Result<(), ReadStoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.tickets.get_mut(&view.booking_id) {
            Some(existing) => {
                existing.status = view.status;
                existing.updated_at = view.updated_at;
            }
            None => {
                inner.tickets.insert(view.booking_id, view.clone());
            }
        }
        Ok(())
    }

    async fn set_ticket_status(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, ReadStoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.tickets.get_mut(&booking_id) {
            Some(view) => {
                view.status = status;
                view.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_user_tickets(
        &self,
        user_id: &UserId,
        status: Option<BookingStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TicketPage, ReadStoreError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<TicketView> = inner
            .tickets
            .values()
            .filter(|t| &t.user_id == user_id && status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let offset = (page.saturating_sub(1) as usize) * limit as usize;
        let data = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(TicketPage {
            data,
            total,
            page,
            limit,
        })
    }

    async fn adjust_booked_seats(
        &self,
        schedule_id: &ScheduleId,
        delta: i32,
        fallback_total_seats: i32,
    ) -> Result<(), ReadStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .schedules
            .entry(schedule_id.clone())
            .or_insert_with(|| ScheduleAvailability {
                schedule_id: schedule_id.clone(),
                total_seats: fallback_total_seats,
                booked_seats: 0,
            });
        entry.booked_seats = (entry.booked_seats + delta).max(0);
        Ok(())
    }

    async fn schedule_availability(
        &self,
        schedule_id: &ScheduleId,
    ) -> Result<Option<ScheduleAvailability>, ReadStoreError> {
        Ok(self.inner.lock().unwrap().schedules.get(schedule_id).cloned())
    }

    async fn checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<Option<ProjectorCheckpoint>, ReadStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .checkpoints
            .get(projection_name)
            .cloned())
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &ProjectorCheckpoint,
    ) -> Result<(), ReadStoreError> {
        self.inner
            .lock()
            .unwrap()
            .checkpoints
            .insert(checkpoint.projection_name.clone(), checkpoint.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ReadStoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.tickets.clear();
        inner.schedules.clear();
        inner.checkpoints.clear();
        Ok(())
    }
}
