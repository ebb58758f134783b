use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

/// Read-only access to advisor leave ranges.
pub struct LeavePeriodRepository;

impl LeavePeriodRepository {
    /// Whether the advisor has a leave period covering the given date.
    pub async fn covers(
        pool: &SqlitePool,
        advisor_id: &str,
        date: NaiveDate,
    ) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM leave_periods
            WHERE advisor_id = ?
              AND start_date <= ?
              AND end_date >= ?
            "#,
        )
        .bind(advisor_id)
        .bind(date)
        .bind(date)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count > 0)
    }
}
