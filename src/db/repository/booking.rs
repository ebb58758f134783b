use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Booking, CreateBooking, STATUS_SCHEDULED};
use crate::error::{AppError, AppResult};

/// Repository for booking records.
///
/// Implementation notes:
/// - `create` relies on the partial unique index on `(slot_date, slot_time)
///   WHERE status = 'scheduled'` to reject double-sold slots; callers must
///   treat a unique violation as a persistence conflict, not a bug.
/// - Duplicate-detection lookups only consider `scheduled` rows, so a
///   cancelled booking frees both the slot and the requester.
pub struct BookingRepository;

const BOOKING_COLUMNS: &str = r#"
    id,
    requester_name,
    requester_email,
    requester_phone,
    subject_name,
    subject_age,
    subject_id,
    source_tag,
    slot_date,
    slot_time,
    scheduled_at,
    status,
    calendar_event_id,
    meeting_link,
    advisor_id,
    assignment_type,
    request_id,
    created_at,
    updated_at
"#;

impl BookingRepository {
    /// Persist a new booking with status `scheduled`.
    pub async fn create(pool: &SqlitePool, booking: CreateBooking) -> AppResult<Booking> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings (
                id,
                requester_name,
                requester_email,
                requester_phone,
                subject_name,
                subject_age,
                subject_id,
                source_tag,
                slot_date,
                slot_time,
                scheduled_at,
                status,
                calendar_event_id,
                meeting_link,
                advisor_id,
                assignment_type,
                request_id,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(booking.requester_name)
        .bind(booking.requester_email)
        .bind(booking.requester_phone)
        .bind(booking.subject_name)
        .bind(booking.subject_age)
        .bind(booking.subject_id)
        .bind(booking.source_tag)
        .bind(booking.slot_date)
        .bind(booking.slot_time)
        .bind(booking.scheduled_at)
        .bind(STATUS_SCHEDULED)
        .bind(booking.calendar_event_id)
        .bind(booking.meeting_link)
        .bind(booking.advisor_id)
        .bind(booking.assignment_type)
        .bind(booking.request_id)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Find a scheduled booking by the same requester for the same slot.
    pub async fn find_scheduled_by_slot(
        pool: &SqlitePool,
        requester_email: &str,
        slot_date: NaiveDate,
        slot_time: &str,
    ) -> AppResult<Option<Booking>> {
        let row = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE requester_email = ?
              AND slot_date = ?
              AND slot_time = ?
              AND status = ?
            "#
        ))
        .bind(requester_email)
        .bind(slot_date)
        .bind(slot_time)
        .bind(STATUS_SCHEDULED)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Find any upcoming scheduled booking for the requester, regardless of
    /// slot. Backs the one-active-reservation-per-requester policy.
    pub async fn find_upcoming_by_email(
        pool: &SqlitePool,
        requester_email: &str,
        now: NaiveDateTime,
    ) -> AppResult<Option<Booking>> {
        let row = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE requester_email = ?
              AND status = ?
              AND scheduled_at >= ?
            ORDER BY scheduled_at ASC
            LIMIT 1
            "#
        ))
        .bind(requester_email)
        .bind(STATUS_SCHEDULED)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
