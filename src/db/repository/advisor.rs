use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::Advisor;
use crate::error::{AppError, AppResult};

/// Repository for the advisor pool.
///
/// The only mutation this service performs on advisors is advancing the
/// `last_assigned_at` fairness cursor, and only through the conditional
/// claim in [`AdvisorRepository::try_claim`]. Everything else is owned by
/// administrative tooling.
pub struct AdvisorRepository;

impl AdvisorRepository {
    /// List advisors eligible for assignment, in fairness order: ascending
    /// `last_assigned_at` with never-assigned (NULL) advisors first.
    pub async fn list_eligible(pool: &SqlitePool) -> AppResult<Vec<Advisor>> {
        let rows = sqlx::query_as::<_, Advisor>(
            r#"
            SELECT
                id,
                name,
                email,
                phone,
                is_active,
                is_available,
                last_assigned_at,
                exit_status,
                created_at,
                updated_at
            FROM advisors
            WHERE is_active = 1
              AND is_available = 1
              AND exit_status IS NULL
            ORDER BY
                CASE WHEN last_assigned_at IS NULL THEN 0 ELSE 1 END,
                last_assigned_at ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Fetch a single advisor by id.
    pub async fn find_by_id(pool: &SqlitePool, advisor_id: &str) -> AppResult<Option<Advisor>> {
        let row = sqlx::query_as::<_, Advisor>(
            r#"
            SELECT
                id,
                name,
                email,
                phone,
                is_active,
                is_available,
                last_assigned_at,
                exit_status,
                created_at,
                updated_at
            FROM advisors
            WHERE id = ?
            "#,
        )
        .bind(advisor_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Attempt to claim an advisor by advancing the fairness cursor.
    ///
    /// The update is conditional on `last_assigned_at` still holding the
    /// value observed when the candidate list was read (`IS` so that NULL
    /// compares correctly). Zero affected rows means a concurrent request
    /// claimed this advisor first; the caller moves on to the next
    /// candidate rather than retrying the same one.
    pub async fn try_claim(
        pool: &SqlitePool,
        advisor_id: &str,
        observed_cursor: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE advisors
            SET last_assigned_at = ?, updated_at = ?
            WHERE id = ? AND last_assigned_at IS ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(advisor_id)
        .bind(observed_cursor)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}
