use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::CalendarConfig;
use crate::error::{AppError, AppResult};

/// A candidate bookable unit within the lookahead window. Slots are
/// projections of gateway availability, identified by `(date, time)`;
/// they are never persisted locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    /// Wall-clock "HH:MM".
    pub time: String,
    pub available: bool,
}

/// Payload for creating a time-blocked event on the shared calendar.
#[derive(Debug, Clone, Serialize)]
pub struct CreateEventRequest {
    pub summary: String,
    pub start: NaiveDateTime,
    pub duration_minutes: i64,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: String,
    /// Contact of the assigned advisor, attached as a second attendee when
    /// an advisor was claimed before the event was created.
    pub advisor_email: Option<String>,
    /// Client-side idempotency token (the booking request id). Logged on
    /// ambiguous timeouts so an orphaned event can be reconciled manually.
    pub client_token: String,
}

/// The gateway's answer to a successful event creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedEvent {
    pub event_id: String,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    slots: Vec<Slot>,
}

/// External calendar gateway: the source of truth for which clock-times are
/// physically bookable, and the owner of the shared calendar events this
/// service creates and (on compensation) deletes.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    /// Fetch candidate slots for the next `window_days` days.
    async fn fetch_slots(&self, window_days: u8) -> AppResult<Vec<Slot>>;

    /// Create a time-blocked event and return its id and meeting link.
    async fn create_event(&self, request: &CreateEventRequest) -> AppResult<CreatedEvent>;

    /// Delete a previously created event. Used by saga compensation.
    async fn delete_event(&self, event_id: &str) -> AppResult<()>;
}

/// HTTP implementation of the calendar gateway.
pub struct HttpCalendarGateway {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpCalendarGateway {
    pub fn new(config: &CalendarConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(AppError::Request)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn upstream_error(context: &str, status: reqwest::StatusCode) -> AppError {
        AppError::Upstream {
            message: format!("{} returned status {}", context, status),
            retry_after_seconds: 60,
        }
    }
}

#[async_trait]
impl CalendarGateway for HttpCalendarGateway {
    async fn fetch_slots(&self, window_days: u8) -> AppResult<Vec<Slot>> {
        let url = format!("{}/availability", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("days", window_days)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error("availability fetch", response.status()));
        }

        let body: AvailabilityResponse = response.json().await?;
        Ok(body.slots)
    }

    async fn create_event(&self, request: &CreateEventRequest) -> AppResult<CreatedEvent> {
        let url = format!("{}/events", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    // The gateway may or may not have created the event. It has
                    // no lookup-by-token endpoint, so the token is logged for
                    // manual reconciliation instead of a blind delete.
                    tracing::error!(
                        client_token = %request.client_token,
                        "Calendar event creation timed out with unknown outcome; manual review required"
                    );
                }
                AppError::Request(e)
            })?;

        if !response.status().is_success() {
            return Err(Self::upstream_error("event creation", response.status()));
        }

        let created: CreatedEvent = response.json().await?;
        tracing::debug!(event_id = %created.event_id, "Calendar event created");
        Ok(created)
    }

    async fn delete_event(&self, event_id: &str) -> AppResult<()> {
        let url = format!("{}/events/{}", self.base_url, event_id);
        let response = self.authorize(self.client.delete(&url)).send().await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error("event deletion", response.status()));
        }

        tracing::debug!(event_id = %event_id, "Calendar event deleted");
        Ok(())
    }
}
