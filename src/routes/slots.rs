use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::availability::SlotsMode;
use crate::services::calendar::Slot;
use crate::AppState;

/// Router for the public slot availability endpoint.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_slots))
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// Lookahead window in days, 1–30. Defaults to the configured window.
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsResponse {
    pub slots: Vec<Slot>,
    pub slots_by_date: BTreeMap<String, Vec<Slot>>,
    pub total_available: usize,
    pub total_slots: usize,
    pub mode: SlotsMode,
    pub age_seconds: u64,
}

/// Serve candidate slots, from cache when fresh enough and from the stale
/// fallback when the calendar gateway is down.
async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> AppResult<Json<SlotsResponse>> {
    let days = match query.days {
        None => None,
        Some(d) if (1..=30).contains(&d) => Some(d as u8),
        Some(_) => {
            return Err(AppError::Validation(
                "days must be between 1 and 30".to_string(),
            ))
        }
    };

    let view = state.availability.get_slots(days).await?;

    let mut slots_by_date: BTreeMap<String, Vec<Slot>> = BTreeMap::new();
    for slot in &view.slots {
        slots_by_date
            .entry(slot.date.to_string())
            .or_default()
            .push(slot.clone());
    }

    Ok(Json(SlotsResponse {
        slots: view.slots,
        slots_by_date,
        total_available: view.total_available,
        total_slots: view.total_slots,
        mode: view.mode,
        age_seconds: view.age_seconds,
    }))
}
