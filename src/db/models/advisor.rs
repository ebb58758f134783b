use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A member of the assignable advisor pool.
///
/// `last_assigned_at` is the fairness cursor: candidates are tried in
/// ascending order of it (never-assigned advisors first), and the field is
/// only ever advanced by the assignment engine's conditional claim. All
/// other fields are owned by administrative tooling outside this service.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Advisor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,

    /// Cleared when the advisor is deactivated by an administrator.
    pub is_active: bool,

    /// Advisor-controlled availability toggle.
    pub is_available: bool,

    /// Fairness cursor; NULL means never assigned.
    pub last_assigned_at: Option<NaiveDateTime>,

    /// Non-null while the advisor is being offboarded. Offboarding advisors
    /// never receive new assignments.
    pub exit_status: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
