use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A queued outbound notification.
///
/// The booking core only enqueues these; a separate delivery worker claims
/// due rows and retries them with backoff. The row stores the template code
/// and the serialized variables so delivery is reproducible even if the
/// booking changes later.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationTask {
    pub id: String,

    /// The booking this notification is about.
    pub booking_id: String,

    /// Template identifier (e.g. 'booking_confirmation').
    pub template_code: String,

    pub recipient_name: String,
    pub recipient_email: String,
    pub recipient_phone: String,

    /// JSON-serialized template variables.
    pub variables_json: String,

    /// 'pending', 'processing', 'succeeded', 'dead' — only 'pending' is
    /// ever written by this service.
    pub status: String,

    pub attempts: i64,
    pub max_attempts: i64,
    pub next_attempt_at: NaiveDateTime,
    pub last_error: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Data required to enqueue a notification.
#[derive(Debug, Clone)]
pub struct CreateNotificationTask {
    pub booking_id: String,
    pub template_code: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub recipient_phone: String,
    pub variables_json: String,
}
