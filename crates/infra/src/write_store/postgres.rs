//! Postgres-backed write store.
//!
//! Implements the per-command transactional protocol:
//!
//! 1. `SELECT … FOR UPDATE` the booking row (for mutations of an existing
//!    aggregate).
//! 2. `SELECT … FOR UPDATE` the matching `seat_availability` row.
//! 3. Mutate the bookings row (`updated_at`, `version = version + 1`).
//! 4. Mutate the seat row if the transition touches a seat.
//! 5. Insert into `booking_events` at the post-mutation version.
//! 6. Commit.
//!
//! Row-level locks serialize the two hot rows; the unique index on
//! `booking_events (aggregate_id, version)` is the write fence: of two
//! concurrent transactions targeting the same booking exactly one commits,
//! the other surfaces `23505` and is mapped to [`WriteStoreError::VersionConflict`].
//!
//! Expected schema (migrations are managed outside this service):
//!
//! ```sql
//! CREATE TABLE bookings (
//!     id              UUID PRIMARY KEY,
//!     user_id         TEXT NOT NULL,
//!     route_id        TEXT NOT NULL,
//!     schedule_id     TEXT NOT NULL,
//!     seat_number     TEXT,
//!     passenger_name  TEXT NOT NULL,
//!     passenger_email TEXT NOT NULL,
//!     passenger_phone TEXT,
//!     price           NUMERIC(12, 2) NOT NULL,
//!     currency        TEXT NOT NULL,
//!     status          TEXT NOT NULL,
//!     payment_id      TEXT,
//!     reserved_at     TIMESTAMPTZ,
//!     confirmed_at    TIMESTAMPTZ,
//!     cancelled_at    TIMESTAMPTZ,
//!     expires_at      TIMESTAMPTZ,
//!     created_at      TIMESTAMPTZ NOT NULL,
//!     updated_at      TIMESTAMPTZ NOT NULL,
//!     version         BIGINT NOT NULL
//! );
//!
//! CREATE TABLE booking_events (
//!     event_id       UUID PRIMARY KEY,
//!     event_type     TEXT NOT NULL,
//!     aggregate_id   UUID NOT NULL,
//!     aggregate_type TEXT NOT NULL,
//!     version        BIGINT NOT NULL,
//!     payload        JSONB NOT NULL,
//!     correlation_id TEXT,
//!     causation_id   TEXT,
//!     created_at     TIMESTAMPTZ NOT NULL,
//!     UNIQUE (aggregate_id, version)
//! );
//!
//! CREATE TABLE seat_availability (
//!     schedule_id  TEXT NOT NULL,
//!     seat_number  TEXT NOT NULL,
//!     status       TEXT NOT NULL,
//!     booking_id   UUID,
//!     locked_until TIMESTAMPTZ,
//!     PRIMARY KEY (schedule_id, seat_number)
//! );
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use faregate_booking::{
    Booking, BookingStatus, SeatAvailability, SeatStatus, SeatTransition,
};
use faregate_core::{BookingId, Currency, Money, PaymentId, RouteId, ScheduleId, UserId};

use super::{
    Correlation, DecideFn, EventRecord, TransitionOutcome, WriteStore, WriteStoreError,
};

#[derive(Debug, Clone)]
pub struct PostgresWriteStore {
    pool: PgPool,
}

impl PostgresWriteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WriteStore for PostgresWriteStore {
    #[instrument(skip(self, booking, seat, record), fields(booking_id = %booking.id), err)]
    async fn create(
        &self,
        booking: &Booking,
        seat: Option<&SeatTransition>,
        record: &EventRecord,
        now: DateTime<Utc>,
    ) -> Result<(), WriteStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        if let Some(seat) = seat {
            apply_seat(&mut tx, seat, booking.id, now).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, user_id, route_id, schedule_id, seat_number,
                passenger_name, passenger_email, passenger_phone,
                price, currency, status, payment_id,
                reserved_at, confirmed_at, cancelled_at, expires_at,
                created_at, updated_at, version
            )
            VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8,
                $9, $10, $11, $12,
                $13, $14, $15, $16,
                $17, $18, $19
            )
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.user_id.as_str())
        .bind(booking.route_id.as_str())
        .bind(booking.schedule_id.as_str())
        .bind(&booking.seat_number)
        .bind(&booking.passenger_name)
        .bind(&booking.passenger_email)
        .bind(&booking.passenger_phone)
        .bind(booking.price.as_decimal())
        .bind(booking.currency.as_str())
        .bind(booking.status.as_str())
        .bind(booking.payment_id.as_ref().map(PaymentId::as_str))
        .bind(booking.reserved_at)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.expires_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_booking", e))?;

        insert_event(&mut tx, record).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self, decide, correlation), fields(booking_id = %booking_id), err)]
    async fn update(
        &self,
        booking_id: BookingId,
        now: DateTime<Utc>,
        decide: DecideFn,
        correlation: &Correlation,
    ) -> Result<TransitionOutcome, WriteStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query(&format!("{BOOKING_SELECT} WHERE id = $1 FOR UPDATE"))
            .bind(booking_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_booking", e))?
            .ok_or(WriteStoreError::NotFound)?;

        let booking = booking_from_row(&row)?;
        let decision = decide(&booking).map_err(WriteStoreError::Rejected)?;

        let mut post = booking.clone();
        post.apply(&decision.event);
        let record = EventRecord::from_event(&decision.event, post.version, correlation);

        sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2,
                payment_id = $3,
                reserved_at = $4,
                confirmed_at = $5,
                cancelled_at = $6,
                expires_at = $7,
                updated_at = $8,
                version = $9
            WHERE id = $1
            "#,
        )
        .bind(post.id.as_uuid())
        .bind(post.status.as_str())
        .bind(post.payment_id.as_ref().map(PaymentId::as_str))
        .bind(post.reserved_at)
        .bind(post.confirmed_at)
        .bind(post.cancelled_at)
        .bind(post.expires_at)
        .bind(post.updated_at)
        .bind(post.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_booking", e))?;

        if let Some(seat) = &decision.seat {
            apply_seat(&mut tx, seat, post.id, now).await?;
        }

        insert_event(&mut tx, &record).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

        Ok(TransitionOutcome {
            booking: post,
            record,
        })
    }

    async fn load(&self, booking_id: BookingId) -> Result<Option<Booking>, WriteStoreError> {
        let row = sqlx::query(&format!("{BOOKING_SELECT} WHERE id = $1"))
            .bind(booking_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_booking", e))?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BookingId>, WriteStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM bookings
            WHERE status = 'RESERVED' AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("expired_reservations", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map(BookingId::from_uuid)
                    .map_err(|e| WriteStoreError::Unavailable(format!("corrupt booking id: {e}")))
            })
            .collect()
    }

    async fn events_after(
        &self,
        booking_id: BookingId,
        after_version: u64,
    ) -> Result<Vec<EventRecord>, WriteStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_id, aggregate_type, version,
                   payload, correlation_id, causation_id, created_at
            FROM booking_events
            WHERE aggregate_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
        )
        .bind(booking_id.as_uuid())
        .bind(after_version as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("events_after", e))?;

        rows.iter().map(event_from_row).collect()
    }

    async fn seat(
        &self,
        schedule_id: &ScheduleId,
        seat_number: &str,
    ) -> Result<Option<SeatAvailability>, WriteStoreError> {
        let row = sqlx::query(
            r#"
            SELECT schedule_id, seat_number, status, booking_id, locked_until
            FROM seat_availability
            WHERE schedule_id = $1 AND seat_number = $2
            "#,
        )
        .bind(schedule_id.as_str())
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_seat", e))?;

        row.as_ref().map(seat_from_row).transpose()
    }
}

const BOOKING_SELECT: &str = r#"
    SELECT id, user_id, route_id, schedule_id, seat_number,
           passenger_name, passenger_email, passenger_phone,
           price, currency, status, payment_id,
           reserved_at, confirmed_at, cancelled_at, expires_at,
           created_at, updated_at, version
    FROM bookings
"#;

/// Lock the seat row (materializing it as AVAILABLE on first touch) and apply
/// the lifecycle transition under that lock.
async fn apply_seat(
    tx: &mut Transaction<'_, Postgres>,
    seat: &SeatTransition,
    booking_id: BookingId,
    now: DateTime<Utc>,
) -> Result<(), WriteStoreError> {
    sqlx::query(
        r#"
        INSERT INTO seat_availability (schedule_id, seat_number, status)
        VALUES ($1, $2, 'AVAILABLE')
        ON CONFLICT (schedule_id, seat_number) DO NOTHING
        "#,
    )
    .bind(seat.schedule_id.as_str())
    .bind(&seat.seat_number)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("ensure_seat", e))?;

    let row = sqlx::query(
        r#"
        SELECT schedule_id, seat_number, status, booking_id, locked_until
        FROM seat_availability
        WHERE schedule_id = $1 AND seat_number = $2
        FOR UPDATE
        "#,
    )
    .bind(seat.schedule_id.as_str())
    .bind(&seat.seat_number)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_seat", e))?;

    let mut availability = seat_from_row(&row)?;
    availability
        .apply(&seat.kind, booking_id, now)
        .map_err(WriteStoreError::Rejected)?;

    sqlx::query(
        r#"
        UPDATE seat_availability
        SET status = $3, booking_id = $4, locked_until = $5
        WHERE schedule_id = $1 AND seat_number = $2
        "#,
    )
    .bind(seat.schedule_id.as_str())
    .bind(&seat.seat_number)
    .bind(availability.status.as_str())
    .bind(availability.booking_id.map(|id| *id.as_uuid()))
    .bind(availability.locked_until)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_seat", e))?;

    Ok(())
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    record: &EventRecord,
) -> Result<(), WriteStoreError> {
    sqlx::query(
        r#"
        INSERT INTO booking_events (
            event_id, event_type, aggregate_id, aggregate_type, version,
            payload, correlation_id, causation_id, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.event_id)
    .bind(&record.event_type)
    .bind(record.aggregate_id.as_uuid())
    .bind(&record.aggregate_type)
    .bind(record.version as i64)
    .bind(&record.payload)
    .bind(&record.correlation_id)
    .bind(&record.causation_id)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            WriteStoreError::VersionConflict(format!(
                "version {} already exists for aggregate {}",
                record.version, record.aggregate_id
            ))
        } else {
            map_sqlx_error("insert_event", e)
        }
    })?;

    Ok(())
}

fn booking_from_row(row: &sqlx::postgres::PgRow) -> Result<Booking, WriteStoreError> {
    let corrupt = |e: String| WriteStoreError::Unavailable(format!("corrupt bookings row: {e}"));

    let status: String = row.try_get("status").map_err(|e| corrupt(e.to_string()))?;
    let currency: String = row.try_get("currency").map_err(|e| corrupt(e.to_string()))?;
    let price: Decimal = row.try_get("price").map_err(|e| corrupt(e.to_string()))?;
    let version: i64 = row.try_get("version").map_err(|e| corrupt(e.to_string()))?;

    Ok(Booking {
        id: BookingId::from_uuid(row.try_get("id").map_err(|e| corrupt(e.to_string()))?),
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
        passenger_phone: row
            .try_get("passenger_phone")
            .map_err(|e| corrupt(e.to_string()))?,
        price: Money::new(price),
        currency: Currency::parse(&currency).map_err(|e| corrupt(e.to_string()))?,
        status: BookingStatus::parse(&status).map_err(|e| corrupt(e.to_string()))?,
        payment_id: row
            .try_get::<Option<String>, _>("payment_id")
            .map_err(|e| corrupt(e.to_string()))?
            .map(PaymentId::new),
        reserved_at: row
            .try_get("reserved_at")
            .map_err(|e| corrupt(e.to_string()))?,
        confirmed_at: row
            .try_get("confirmed_at")
            .map_err(|e| corrupt(e.to_string()))?,
        cancelled_at: row
            .try_get("cancelled_at")
            .map_err(|e| corrupt(e.to_string()))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| corrupt(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| corrupt(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| corrupt(e.to_string()))?,
        version: version as u64,
    })
}

fn seat_from_row(row: &sqlx::postgres::PgRow) -> Result<SeatAvailability, WriteStoreError> {
    let corrupt =
        |e: String| WriteStoreError::Unavailable(format!("corrupt seat_availability row: {e}"));

    let status: String = row.try_get("status").map_err(|e| corrupt(e.to_string()))?;

    Ok(SeatAvailability {
        schedule_id: ScheduleId::new(
            row.try_get::<String, _>("schedule_id")
                .map_err(|e| corrupt(e.to_string()))?,
        ),
        seat_number: row
            .try_get("seat_number")
            .map_err(|e| corrupt(e.to_string()))?,
        status: SeatStatus::parse(&status).map_err(|e| corrupt(e.to_string()))?,
        booking_id: row
            .try_get::<Option<Uuid>, _>("booking_id")
            .map_err(|e| corrupt(e.to_string()))?
            .map(BookingId::from_uuid),
        locked_until: row
            .try_get("locked_until")
            .map_err(|e| corrupt(e.to_string()))?,
    })
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<EventRecord, WriteStoreError> {
    let corrupt =
        |e: String| WriteStoreError::Unavailable(format!("corrupt booking_events row: {e}"));

    let version: i64 = row.try_get("version").map_err(|e| corrupt(e.to_string()))?;

    Ok(EventRecord {
        event_id: row.try_get("event_id").map_err(|e| corrupt(e.to_string()))?,
        event_type: row
            .try_get("event_type")
            .map_err(|e| corrupt(e.to_string()))?,
        aggregate_id: BookingId::from_uuid(
            row.try_get("aggregate_id")
                .map_err(|e| corrupt(e.to_string()))?,
        ),
        aggregate_type: row
            .try_get("aggregate_type")
            .map_err(|e| corrupt(e.to_string()))?,
        version: version as u64,
        payload: row.try_get("payload").map_err(|e| corrupt(e.to_string()))?,
        correlation_id: row
            .try_get("correlation_id")
            .map_err(|e| corrupt(e.to_string()))?,
        causation_id: row
            .try_get("causation_id")
            .map_err(|e| corrupt(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| corrupt(e.to_string()))?,
    })
}

/// Map sqlx failures onto store errors; `23505` is the write fence firing.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> WriteStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                WriteStoreError::VersionConflict(msg)
            } else {
                WriteStoreError::Unavailable(msg)
            }
        }
        other => WriteStoreError::Unavailable(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}
