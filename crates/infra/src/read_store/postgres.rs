//! Postgres-backed read store.
//!
//! Expected schema (migrations are managed outside this service):
//!
//! ```sql
//! CREATE TABLE user_tickets_view (
//!     booking_id       UUID PRIMARY KEY,
//!     user_id          TEXT NOT NULL,
//!     route_id         TEXT NOT NULL,
//!     schedule_id      TEXT NOT NULL,
//!     seat_number      TEXT,
//!     passenger_name   TEXT NOT NULL,
//!     passenger_email  TEXT NOT NULL,
//!     price            NUMERIC(12, 2) NOT NULL,
//!     currency         TEXT NOT NULL,
//!     status           TEXT NOT NULL,
//!     route_name       TEXT,
//!     departure_time   TIMESTAMPTZ,
//!     arrival_time     TIMESTAMPTZ,
//!     origin_stop      TEXT,
//!     destination_stop TEXT,
//!     created_at       TIMESTAMPTZ NOT NULL,
//!     updated_at       TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX user_tickets_view_user_created
//!     ON user_tickets_view (user_id, created_at DESC);
//!
//! CREATE TABLE schedule_availability_view (
//!     schedule_id  TEXT PRIMARY KEY,
//!     total_seats  INT NOT NULL,
//!     booked_seats INT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE projection_checkpoints (
//!     projection_name         TEXT PRIMARY KEY,
//!     last_processed_event_id UUID NOT NULL,
//!     last_processed_at       TIMESTAMPTZ NOT NULL
//! );
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use faregate_booking::BookingStatus;
use faregate_core::{BookingId, Currency, Money, RouteId, ScheduleId, UserId};

use super::{
    ProjectorCheckpoint, ReadStore, ReadStoreError, ScheduleAvailability, TicketPage, TicketView,
};

#[derive(Debug, Clone)]
pub struct PostgresReadStore {
    pool: PgPool,
}

impl PostgresReadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReadStore for PostgresReadStore {
    async fn get_ticket(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<TicketView>, ReadStoreError> {
        let row = sqlx::query(&format!("{TICKET_SELECT} WHERE booking_id = $1"))
            .bind(booking_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("get_ticket", e))?;

        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn upsert_ticket(&self, view: &TicketView) -> Result<(), ReadStoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_tickets_view (
                booking_id, user_id, route_id, schedule_id, seat_number,
                passenger_name, passenger_email, price, currency, status,
                route_name, departure_time, arrival_time, origin_stop, destination_stop,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (booking_id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(view.booking_id.as_uuid())
        .bind(view.user_id.as_str())
        .bind(view.route_id.as_str())
        .bind(view.schedule_id.as_str())
        .bind(&view.seat_number)
        .bind(&view.passenger_name)
        .bind(&view.passenger_email)
        .bind(view.price.as_decimal())
        .bind(view.currency.as_str())
        .bind(view.status.as_str())
        .bind(&view.route_name)
        .bind(view.departure_time)
        .bind(view.arrival_time)
        .bind(&view.origin_stop)
        .bind(&view.destination_stop)
        .bind(view.created_at)
        .bind(view.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("upsert_ticket", e))?;

        Ok(())
    }

    async fn set_ticket_status(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, ReadStoreError> {
        let result = sqlx::query(
            "UPDATE user_tickets_view SET status = $2, updated_at = $3 WHERE booking_id = $1",
        )
        .bind(booking_id.as_uuid())
        .bind(status.as_str())
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("set_ticket_status", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_user_tickets(
        &self,
        user_id: &UserId,
        status: Option<BookingStatus>,
        page: u32,
        limit: u32,
    ) -> Result<TicketPage, ReadStoreError> {
        let status_param = status.map(|s| s.as_str());
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM user_tickets_view
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(user_id.as_str())
        .bind(status_param)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unavailable("count_user_tickets", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?;

        let rows = sqlx::query(&format!(
            r#"
            {TICKET_SELECT}
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id.as_str())
        .bind(status_param)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| unavailable("list_user_tickets", e))?;

        let data = rows
            .iter()
            .map(ticket_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TicketPage {
            data,
            total: total.max(0) as u64,
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
        sqlx::query(
            r#"
            INSERT INTO schedule_availability_view (schedule_id, total_seats, booked_seats)
            VALUES ($1, $2, GREATEST($3, 0))
            ON CONFLICT (schedule_id) DO UPDATE SET
                booked_seats = GREATEST(schedule_availability_view.booked_seats + $3, 0)
            "#,
        )
        .bind(schedule_id.as_str())
        .bind(fallback_total_seats)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("adjust_booked_seats", e))?;

        Ok(())
    }

    async fn schedule_availability(
        &self,
        schedule_id: &ScheduleId,
    ) -> Result<Option<ScheduleAvailability>, ReadStoreError> {
        let row = sqlx::query(
            r#"
            SELECT schedule_id, total_seats, booked_seats
            FROM schedule_availability_view
            WHERE schedule_id = $1
            "#,
        )
        .bind(schedule_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("schedule_availability", e))?;

        row.map(|row| -> Result<ScheduleAvailability, ReadStoreError> {
            Ok(ScheduleAvailability {
                schedule_id: ScheduleId::new(
                    row.try_get::<String, _>("schedule_id")
                        .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?,
                ),
                total_seats: row
                    .try_get("total_seats")
                    .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?,
                booked_seats: row
                    .try_get("booked_seats")
                    .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?,
            })
        })
        .transpose()
    }

    async fn checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<Option<ProjectorCheckpoint>, ReadStoreError> {
        let row = sqlx::query(
            r#"
            SELECT projection_name, last_processed_event_id, last_processed_at
            FROM projection_checkpoints
            WHERE projection_name = $1
            "#,
        )
        .bind(projection_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("checkpoint", e))?;

        row.map(|row| -> Result<ProjectorCheckpoint, ReadStoreError> {
            Ok(ProjectorCheckpoint {
                projection_name: row
                    .try_get("projection_name")
                    .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?,
                last_processed_event_id: row
                    .try_get::<Uuid, _>("last_processed_event_id")
                    .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?,
                last_processed_at: row
                    .try_get("last_processed_at")
                    .map_err(|e| ReadStoreError::Corrupt(e.to_string()))?,
            })
        })
        .transpose()
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &ProjectorCheckpoint,
    ) -> Result<(), ReadStoreError> {
        sqlx::query(
            r#"
            INSERT INTO projection_checkpoints (
                projection_name, last_processed_event_id, last_processed_at
            )
            VALUES ($1, $2, $3)
            ON CONFLICT (projection_name) DO UPDATE SET
                last_processed_event_id = EXCLUDED.last_processed_event_id,
                last_processed_at = EXCLUDED.last_processed_at
            "#,
        )
        .bind(&checkpoint.projection_name)
        .bind(checkpoint.last_processed_event_id)
        .bind(checkpoint.last_processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("save_checkpoint", e))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), ReadStoreError> {
        sqlx::query(
            "TRUNCATE user_tickets_view, schedule_availability_view, projection_checkpoints",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| unavailable("clear", e))?;
        Ok(())
    }
}

const TICKET_SELECT: &str = r#"
    SELECT booking_id, user_id, route_id, schedule_id, seat_number,
           passenger_name, passenger_email, price, currency, status,
           route_name, departure_time, arrival_time, origin_stop, destination_stop,
           created_at, updated_at
    FROM user_tickets_view
"#;

fn ticket_from_row(row: &sqlx::postgres::PgRow) -> Result<TicketView, ReadStoreError> {
    let corrupt = |e: String| ReadStoreError::Corrupt(e);

    let status: String = row.try_get("status").map_err(|e| corrupt(e.to_string()))?;
    let currency: String = row.try_get("currency").map_err(|e| corrupt(e.to_string()))?;
    let price: Decimal = row.try_get("price").map_err(|e| corrupt(e.to_string()))?;

    Ok(TicketView {
        booking_id: BookingId::from_uuid(
            row.try_get("booking_id").map_err(|e| corrupt(e.to_string()))?,
        ),
        user_id: UserId::new(
            row.try_get::<String, _>("user_id")
                .map_err(|e| corrupt(e.to_string()))?,
        ),
        route_id: RouteId::new(
            row.try_get::<String, _>("route_id")
                .map_err(|e| corrupt(e.to_string()))?,
        ),
        schedule_id: ScheduleId::new(
            row.try_get::<String, _>("schedule_id")
                .map_err(|e| corrupt(e.to_string()))?,
        ),
        seat_number: row
            .try_get("seat_number")
            .map_err(|e| corrupt(e.to_string()))?,
        passenger_name: row
            .try_get("passenger_name")
            .map_err(|e| corrupt(e.to_string()))?,
        passenger_email: row
            .try_get("passenger_email")
            .map_err(|e| corrupt(e.to_string()))?,
        price: Money::new(price),
        currency: Currency::parse(&currency).map_err(|e| corrupt(e.to_string()))?,
        status: BookingStatus::parse(&status).map_err(|e| corrupt(e.to_string()))?,
        route_name: row
            .try_get("route_name")
            .map_err(|e| corrupt(e.to_string()))?,
        departure_time: row
            .try_get("departure_time")
            .map_err(|e| corrupt(e.to_string()))?,
        arrival_time: row
            .try_get("arrival_time")
            .map_err(|e| corrupt(e.to_string()))?,
        origin_stop: row
            .try_get("origin_stop")
            .map_err(|e| corrupt(e.to_string()))?,
        destination_stop: row
            .try_get("destination_stop")
            .map_err(|e| corrupt(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| corrupt(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| corrupt(e.to_string()))?,
    })
}

fn unavailable(operation: &str, err: sqlx::Error) -> ReadStoreError {
    ReadStoreError::Unavailable(format!("{operation}: {err}"))
}
