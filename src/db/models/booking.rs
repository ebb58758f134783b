use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Booking status values. Creation only produces `scheduled`; the rest of
/// the lifecycle (cancellation, rescheduling) is handled elsewhere.
pub const STATUS_SCHEDULED: &str = "scheduled";

/// How the advisor reference on a booking came to be.
pub const ASSIGNMENT_AUTO: &str = "auto";
/// No advisor could be claimed at booking time; a manual or background
/// process assigns one later.
pub const ASSIGNMENT_PENDING: &str = "pending";

/// The durable record of a reserved intro call.
///
/// Created exactly once per successful booking saga. `calendar_event_id`
/// always refers to a real remote event except transiently while a failed
/// saga is compensating.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,

    pub requester_name: String,
    pub requester_email: String,
    pub requester_phone: String,

    /// Who the call is about (the child, in this domain).
    pub subject_name: String,
    pub subject_age: i64,
    pub subject_id: Option<String>,

    /// Marketing/attribution tag supplied by the form, if any.
    pub source_tag: Option<String>,

    pub slot_date: NaiveDate,
    /// Wall-clock "HH:MM" within booking hours.
    pub slot_time: String,
    pub scheduled_at: NaiveDateTime,

    pub status: String,

    pub calendar_event_id: String,
    pub meeting_link: Option<String>,

    pub advisor_id: Option<String>,
    /// `auto` when the assignment engine claimed an advisor, `pending`
    /// otherwise.
    pub assignment_type: String,

    /// Caller-supplied idempotency identifier (generated when absent).
    pub request_id: String,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Data required to persist a new booking.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub requester_name: String,
    pub requester_email: String,
    pub requester_phone: String,
    pub subject_name: String,
    pub subject_age: i64,
    pub subject_id: Option<String>,
    pub source_tag: Option<String>,
    pub slot_date: NaiveDate,
    pub slot_time: String,
    pub scheduled_at: NaiveDateTime,
    pub calendar_event_id: String,
    pub meeting_link: Option<String>,
    pub advisor_id: Option<String>,
    pub assignment_type: String,
    pub request_id: String,
}
