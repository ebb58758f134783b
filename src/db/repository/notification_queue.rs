use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateNotificationTask, NotificationTask};
use crate::error::{AppError, AppResult};

/// Enqueue-side of the persistent notification queue.
///
/// The booking core only creates `pending` rows; claiming, retrying with
/// backoff and dead-lettering belong to the separate delivery worker.
pub struct NotificationQueueRepository;

const TASK_COLUMNS: &str = r#"
    id,
    booking_id,
    template_code,
    recipient_name,
    recipient_email,
    recipient_phone,
    variables_json,
    status,
    attempts,
    max_attempts,
    next_attempt_at,
    last_error,
    created_at,
    updated_at
"#;

impl NotificationQueueRepository {
    /// Enqueue a notification for asynchronous delivery, due immediately.
    pub async fn enqueue(
        pool: &SqlitePool,
        task: CreateNotificationTask,
    ) -> AppResult<NotificationTask> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, NotificationTask>(&format!(
            r#"
            INSERT INTO notification_queue (
                id,
                booking_id,
                template_code,
                recipient_name,
                recipient_email,
                recipient_phone,
                variables_json,
                status,
                attempts,
                max_attempts,
                next_attempt_at,
                last_error,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(task.booking_id)
        .bind(task.template_code)
        .bind(task.recipient_name)
        .bind(task.recipient_email)
        .bind(task.recipient_phone)
        .bind(task.variables_json)
        .bind("pending")
        .bind(0i64)
        .bind(5i64)
        .bind(now)
        .bind::<Option<String>>(None)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Tasks enqueued for a booking, oldest first.
    pub async fn find_by_booking(
        pool: &SqlitePool,
        booking_id: &str,
    ) -> AppResult<Vec<NotificationTask>> {
        let rows = sqlx::query_as::<_, NotificationTask>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM notification_queue
            WHERE booking_id = ?
            ORDER BY created_at ASC
            "#
        ))
        .bind(booking_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
