//! Read-side storage port: the denormalized tickets view, the per-schedule
//! availability counter, and the projector checkpoint.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryReadStore;
pub use postgres::PostgresReadStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use faregate_booking::BookingStatus;
use faregate_core::{BookingId, Currency, Money, RouteId, ScheduleId, UserId};

/// One row of `user_tickets_view`: the booking's display snapshot plus
/// route/schedule fields that stay null until an enrichment process fills
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub route_id: RouteId,
    pub schedule_id: ScheduleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    pub passenger_name: String,
    pub passenger_email: String,
    pub price: Money,
    pub currency: Currency,
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_stop: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-schedule seat counter; `available_seats` is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAvailability {
    pub schedule_id: ScheduleId,
    pub total_seats: i32,
    pub booked_seats: i32,
}

impl ScheduleAvailability {
    pub fn available_seats(&self) -> i32 {
        (self.total_seats - self.booked_seats).max(0)
    }
}

/// Named cursor of the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorCheckpoint {
    pub projection_name: String,
    pub last_processed_event_id: Uuid,
    pub last_processed_at: DateTime<Utc>,
}

/// One page of a user's tickets, ordered by `created_at` descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPage {
    pub data: Vec<TicketView>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl TicketPage {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

#[derive(Debug, Error)]
pub enum ReadStoreError {
    #[error("read store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt read-model row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ReadStore: Send + Sync {
    async fn get_ticket(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<TicketView>, ReadStoreError>;

    /// Insert the view, or (when the id already exists) update its status and
    /// `updated_at` without clobbering enrichment fields.
    async fn upsert_ticket(&self, view: &TicketView) -> Result<(), ReadStoreError>;

    /// Set the status by id; returns whether a row was touched.
    async fn set_ticket_status(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, ReadStoreError>;

    async fn list_user_tickets(
        &self,
        user_id: &UserId,
        status: Option<BookingStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TicketPage, ReadStoreError>;

    /// Adjust `booked_seats` by `delta`, clamped at zero; a missing row is
    /// created with `fallback_total_seats`.
    async fn adjust_booked_seats(
        &self,
        schedule_id: &ScheduleId,
        delta: i32,
        fallback_total_seats: i32,
    ) -> Result<(), ReadStoreError>;

    async fn schedule_availability(
        &self,
        schedule_id: &ScheduleId,
    ) -> Result<Option<ScheduleAvailability>, ReadStoreError>;

    async fn checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<Option<ProjectorCheckpoint>, ReadStoreError>;

    async fn save_checkpoint(
        &self,
        checkpoint: &ProjectorCheckpoint,
    ) -> Result<(), ReadStoreError>;

    /// Wipe views, counters, and checkpoints (operator rebuilds).
    async fn clear(&self) -> Result<(), ReadStoreError>;
}
