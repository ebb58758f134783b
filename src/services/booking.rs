use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::models::{
    Advisor, Booking, CreateBooking, CreateNotificationTask, ASSIGNMENT_AUTO, ASSIGNMENT_PENDING,
};
use crate::db::{BookingRepository, NotificationQueueRepository};
use crate::error::{AppError, AppResult};
use crate::services::assignment::AssignmentEngine;
use crate::services::calendar::{CalendarGateway, CreateEventRequest};

/// Template rendered by the notification delivery worker for a confirmed
/// booking.
pub const TEMPLATE_BOOKING_CONFIRMATION: &str = "booking_confirmation";

/// A booking request that already passed field validation, rate limiting
/// and duplicate detection. `requester_email` is normalized.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub requester_name: String,
    pub requester_email: String,
    pub requester_phone: String,
    pub subject_name: String,
    pub subject_age: i64,
    pub subject_id: Option<String>,
    pub source_tag: Option<String>,
    pub slot_date: NaiveDate,
    pub slot_time: String,
    pub request_id: String,
}

/// What the saga produced.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub advisor: Option<Advisor>,
}

/// Combine a slot's `(date, "HH:MM")` identity into its timestamp.
pub fn slot_datetime(date: NaiveDate, time: &str) -> AppResult<NaiveDateTime> {
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| AppError::Validation("time must be formatted as HH:MM".to_string()))?;
    Ok(date.and_time(time))
}

/// Idempotency check run before the saga starts.
///
/// Returns the booking to short-circuit with when the requester already
/// holds the same slot, or any upcoming reservation (one active reservation
/// per requester). The check-then-act window this leaves open is closed by
/// the unique index at persistence time.
pub async fn find_existing_booking(
    pool: &SqlitePool,
    requester_email: &str,
    slot_date: NaiveDate,
    slot_time: &str,
    now: NaiveDateTime,
) -> AppResult<Option<Booking>> {
    if let Some(same_slot) =
        BookingRepository::find_scheduled_by_slot(pool, requester_email, slot_date, slot_time)
            .await?
    {
        return Ok(Some(same_slot));
    }

    BookingRepository::find_upcoming_by_email(pool, requester_email, now).await
}

/// The booking saga: calendar-event creation, advisor assignment and local
/// persistence composed into one logical operation, with the calendar event
/// explicitly compensated when persistence fails after it was created.
pub struct BookingOrchestrator;

impl BookingOrchestrator {
    pub async fn book(
        pool: &SqlitePool,
        gateway: &dyn CalendarGateway,
        config: &Config,
        request: BookingRequest,
    ) -> AppResult<BookingOutcome> {
        // Step 1: lead-time check. The slot list the caller saw may be
        // minutes old; anything closer than the lead time is gone.
        let scheduled_at = slot_datetime(request.slot_date, &request.slot_time)?;
        let now = Utc::now().naive_utc();
        if scheduled_at < now + Duration::minutes(config.booking.min_lead_minutes) {
            return Err(AppError::Validation(
                "This slot is no longer available".to_string(),
            ));
        }

        // Step 2: claim an advisor. No external side effect yet, so there
        // is nothing to compensate if a later step fails.
        let advisor = AssignmentEngine::assign_next(pool, request.slot_date).await?;

        // Step 3: create the calendar event. Failure here aborts the saga
        // before any local state was written.
        let event = gateway
            .create_event(&CreateEventRequest {
                summary: format!("Intro call: {}", request.subject_name),
                start: scheduled_at,
                duration_minutes: config.calendar.event_duration_minutes,
                attendee_name: request.requester_name.clone(),
                attendee_email: request.requester_email.clone(),
                attendee_phone: request.requester_phone.clone(),
                advisor_email: advisor.as_ref().map(|a| a.email.clone()),
                client_token: request.request_id.clone(),
            })
            .await?;

        // Step 4: persist the booking. From here on a failure leaves an
        // orphaned remote event, so the event is deleted on the way out.
        let assignment_type = if advisor.is_some() {
            ASSIGNMENT_AUTO
        } else {
            ASSIGNMENT_PENDING
        };

        let create = CreateBooking {
            requester_name: request.requester_name.clone(),
            requester_email: request.requester_email.clone(),
            requester_phone: request.requester_phone.clone(),
            subject_name: request.subject_name.clone(),
            subject_age: request.subject_age,
            subject_id: request.subject_id.clone(),
            source_tag: request.source_tag.clone(),
            slot_date: request.slot_date,
            slot_time: request.slot_time.clone(),
            scheduled_at,
            calendar_event_id: event.event_id.clone(),
            meeting_link: event.meeting_link.clone(),
            advisor_id: advisor.as_ref().map(|a| a.id.clone()),
            assignment_type: assignment_type.to_string(),
            request_id: request.request_id.clone(),
        };

        let booking = match BookingRepository::create(pool, create).await {
            Ok(booking) => booking,
            Err(err) => {
                match &err {
                    AppError::Database(db_err) if AppError::is_unique_violation(db_err) => {
                        warn!(
                            slot_date = %request.slot_date,
                            slot_time = %request.slot_time,
                            "Slot was sold concurrently; compensating calendar event"
                        );
                    }
                    _ => {
                        error!(
                            error = ?err,
                            "Booking persistence failed; compensating calendar event"
                        );
                    }
                }

                if let Err(delete_err) = gateway.delete_event(&event.event_id).await {
                    // The remote event is now orphaned. Surface it loudly
                    // for manual reconciliation; the caller still gets the
                    // generic retryable failure.
                    error!(
                        calendar_event_id = %event.event_id,
                        error = ?delete_err,
                        "Compensation failed: orphaned calendar event requires manual cleanup"
                    );
                }

                return Err(AppError::BookingConflict);
            }
        };

        // Step 5: enqueue the confirmation. Delivery is a separately retried
        // concern; a queue failure never undoes the booking.
        let variables = serde_json::json!({
            "requesterName": booking.requester_name,
            "subjectName": booking.subject_name,
            "date": booking.slot_date.to_string(),
            "time": booking.slot_time,
            "meetingLink": booking.meeting_link,
            "advisorName": advisor.as_ref().map(|a| a.name.clone()),
        });

        if let Err(err) = NotificationQueueRepository::enqueue(
            pool,
            CreateNotificationTask {
                booking_id: booking.id.clone(),
                template_code: TEMPLATE_BOOKING_CONFIRMATION.to_string(),
                recipient_name: booking.requester_name.clone(),
                recipient_email: booking.requester_email.clone(),
                recipient_phone: booking.requester_phone.clone(),
                variables_json: variables.to_string(),
            },
        )
        .await
        {
            warn!(
                booking_id = %booking.id,
                error = ?err,
                "Failed to enqueue confirmation notification"
            );
        }

        info!(
            booking_id = %booking.id,
            assignment_type = %booking.assignment_type,
            "Booking created"
        );

        Ok(BookingOutcome { booking, advisor })
    }
}
