use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BookingConfig;
use crate::db::models::Booking;
use crate::db::AdvisorRepository;
use crate::error::{AppError, AppResult};
use crate::services::booking::{
    find_existing_booking, BookingOrchestrator, BookingOutcome, BookingRequest,
};
use crate::services::guard::normalize_identity;
use crate::AppState;

/// Router for the booking write endpoint.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(create_booking))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingPayload {
    pub requester_name: String,
    pub requester_email: String,
    pub requester_phone: String,
    pub subject_name: String,
    pub subject_age: i64,
    /// Slot date, "YYYY-MM-DD".
    pub date: String,
    /// Slot time, "HH:MM".
    pub time: String,
    pub subject_id: Option<String>,
    pub source_tag: Option<String>,
    /// Caller-supplied idempotency identifier; generated when absent.
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub success: bool,
    pub booking_id: String,
    pub calendar_event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,
    pub date: String,
    pub time: String,
    pub scheduled_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_advisor: Option<String>,
    /// True when an identical or conflicting request short-circuited to an
    /// existing booking instead of creating a new one.
    pub already_booked: bool,
}

impl BookingResponse {
    fn from_booking(booking: &Booking, assigned_advisor: Option<String>, already_booked: bool) -> Self {
        Self {
            success: true,
            booking_id: booking.id.clone(),
            calendar_event_id: booking.calendar_event_id.clone(),
            meeting_link: booking.meeting_link.clone(),
            date: booking.slot_date.to_string(),
            time: booking.slot_time.clone(),
            scheduled_at: booking.scheduled_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            assigned_advisor,
            already_booked,
        }
    }
}

/// Create a booking: validate, rate-limit, short-circuit duplicates, then
/// run the saga.
async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBookingPayload>,
) -> AppResult<Json<BookingResponse>> {
    let validated = validate_payload(&payload, &state.config.booking)?;

    let admission = state.guard.admit(&validated.requester_email);
    if !admission.allowed {
        return Err(AppError::RateLimited {
            retry_after_seconds: admission.retry_after_seconds,
        });
    }

    let now = Utc::now().naive_utc();
    if let Some(existing) = find_existing_booking(
        &state.db,
        &validated.requester_email,
        validated.slot_date,
        &validated.slot_time,
        now,
    )
    .await?
    {
        tracing::info!(
            booking_id = %existing.id,
            "Duplicate booking request short-circuited to existing booking"
        );
        let advisor_name = match existing.advisor_id.as_deref() {
            Some(id) => AdvisorRepository::find_by_id(&state.db, id)
                .await?
                .map(|a| a.name),
            None => None,
        };
        return Ok(Json(BookingResponse::from_booking(
            &existing,
            advisor_name,
            true,
        )));
    }

    let request = BookingRequest {
        requester_name: validated.requester_name,
        requester_email: validated.requester_email,
        requester_phone: validated.requester_phone,
        subject_name: validated.subject_name,
        subject_age: validated.subject_age,
        subject_id: payload.subject_id.clone(),
        source_tag: payload.source_tag.clone(),
        slot_date: validated.slot_date,
        slot_time: validated.slot_time,
        request_id: validated.request_id,
    };

    let BookingOutcome { booking, advisor } =
        BookingOrchestrator::book(&state.db, state.gateway.as_ref(), &state.config, request)
            .await?;

    Ok(Json(BookingResponse::from_booking(
        &booking,
        advisor.map(|a| a.name),
        false,
    )))
}

struct ValidatedPayload {
    requester_name: String,
    requester_email: String,
    requester_phone: String,
    subject_name: String,
    subject_age: i64,
    slot_date: NaiveDate,
    slot_time: String,
    request_id: String,
}

fn validate_payload(
    payload: &CreateBookingPayload,
    config: &BookingConfig,
) -> AppResult<ValidatedPayload> {
    let requester_name = payload.requester_name.trim().to_string();
    if requester_name.is_empty() {
        return Err(AppError::Validation("requesterName is required".to_string()));
    }

    let requester_email = normalize_identity(&payload.requester_email);
    if !is_valid_email(&requester_email) {
        return Err(AppError::Validation(
            "requesterEmail is not a valid email address".to_string(),
        ));
    }

    let requester_phone = payload.requester_phone.trim().to_string();
    if !is_valid_mobile_phone(&requester_phone) {
        return Err(AppError::Validation(
            "requesterPhone is not a valid mobile number".to_string(),
        ));
    }

    let subject_name = payload.subject_name.trim().to_string();
    if subject_name.is_empty() {
        return Err(AppError::Validation("subjectName is required".to_string()));
    }

    if payload.subject_age < config.min_subject_age as i64
        || payload.subject_age > config.max_subject_age as i64
    {
        return Err(AppError::Validation(format!(
            "subjectAge must be between {} and {}",
            config.min_subject_age, config.max_subject_age
        )));
    }

    let slot_date = NaiveDate::parse_from_str(payload.date.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be formatted as YYYY-MM-DD".to_string()))?;
    if slot_date < Utc::now().date_naive() {
        return Err(AppError::Validation("date must not be in the past".to_string()));
    }

    let slot_time = parse_booking_time(payload.time.trim(), config)?;

    let request_id = payload
        .request_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(ValidatedPayload {
        requester_name,
        requester_email,
        requester_phone,
        subject_name,
        subject_age: payload.subject_age,
        slot_date,
        slot_time,
        request_id,
    })
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

/// Mobile numbers are accepted in local form ("05X XXX XXXX") or with the
/// country prefix ("+972 5X XXX XXXX"); separators are ignored.
fn is_valid_mobile_phone(phone: &str) -> bool {
    if phone
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')')))
    {
        return false;
    }

    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 10 && digits.starts_with("05"))
        || (digits.len() == 12 && digits.starts_with("9725"))
}

/// Parse "HH:MM", reject anything outside the configured booking hours, and
/// return the canonical zero-padded form.
fn parse_booking_time(time: &str, config: &BookingConfig) -> AppResult<String> {
    let parsed = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| AppError::Validation("time must be formatted as HH:MM".to_string()))?;

    let open = NaiveTime::parse_from_str(&config.open_time, "%H:%M")
        .map_err(|_| AppError::Config(format!("invalid open_time: {}", config.open_time)))?;
    let close = NaiveTime::parse_from_str(&config.close_time, "%H:%M")
        .map_err(|_| AppError::Config(format!("invalid close_time: {}", config.close_time)))?;

    if parsed < open || parsed > close {
        return Err(AppError::Validation(format!(
            "time must be between {} and {}",
            config.open_time, config.close_time
        )));
    }

    Ok(parsed.format("%H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::db::test_support::test_pool;
    use crate::services::availability::AvailabilityCache;
    use crate::services::calendar::{CalendarGateway, CreateEventRequest, CreatedEvent, Slot};
    use crate::services::guard::InMemoryRequestGuard;

    fn booking_config() -> BookingConfig {
        Config::default().booking
    }

    fn payload() -> CreateBookingPayload {
        CreateBookingPayload {
            requester_name: "Dana Levi".to_string(),
            requester_email: "Dana@Example.com".to_string(),
            requester_phone: "052-123-4567".to_string(),
            subject_name: "Tom".to_string(),
            subject_age: 9,
            date: (Utc::now().date_naive() + chrono::Duration::days(3)).to_string(),
            time: "14:00".to_string(),
            subject_id: None,
            source_tag: None,
            request_id: None,
        }
    }

    #[test]
    fn valid_payload_is_normalized() {
        let validated = validate_payload(&payload(), &booking_config()).unwrap();
        assert_eq!(validated.requester_email, "dana@example.com");
        assert_eq!(validated.slot_time, "14:00");
        assert!(!validated.request_id.is_empty());
    }

    #[test]
    fn email_validation() {
        for good in ["a@b.co", "first.last@sub.domain.org"] {
            assert!(is_valid_email(good), "rejected {:?}", good);
        }
        for bad in ["", "nope", "a@b", "@b.co", "a@", "a b@c.co", "a@.co", "a@b.co."] {
            assert!(!is_valid_email(bad), "accepted {:?}", bad);
        }
    }

    #[test]
    fn phone_validation() {
        for good in ["0521234567", "052-123-4567", "+972521234567", "+972 52 123 4567"] {
            assert!(is_valid_mobile_phone(good), "rejected {:?}", good);
        }
        for bad in ["", "12345", "0521234", "031234567", "abc", "052123456789"] {
            assert!(!is_valid_mobile_phone(bad), "accepted {:?}", bad);
        }
    }

    #[test]
    fn time_outside_booking_hours_is_rejected() {
        let config = booking_config();
        assert_eq!(parse_booking_time("9:30", &config).unwrap(), "09:30");
        assert!(parse_booking_time("08:59", &config).is_err());
        assert!(parse_booking_time("20:01", &config).is_err());
        assert!(parse_booking_time("20:00", &config).is_ok());
    }

    #[test]
    fn age_band_is_enforced() {
        let config = booking_config();

        let mut too_young = payload();
        too_young.subject_age = 2;
        assert!(validate_payload(&too_young, &config).is_err());

        let mut too_old = payload();
        too_old.subject_age = 19;
        assert!(validate_payload(&too_old, &config).is_err());
    }

    #[test]
    fn past_date_is_rejected() {
        let config = booking_config();
        let mut past = payload();
        past.date = (Utc::now().date_naive() - chrono::Duration::days(1)).to_string();
        assert!(validate_payload(&past, &config).is_err());
    }

    #[test]
    fn supplied_request_id_is_kept() {
        let mut with_id = payload();
        with_id.request_id = Some("  req-42  ".to_string());
        let validated = validate_payload(&with_id, &booking_config()).unwrap();
        assert_eq!(validated.request_id, "req-42");
    }

    struct StubGateway {
        created: AtomicU32,
    }

    #[async_trait]
    impl CalendarGateway for StubGateway {
        async fn fetch_slots(&self, _window_days: u8) -> AppResult<Vec<Slot>> {
            unreachable!("booking tests never fetch slots")
        }

        async fn create_event(&self, _request: &CreateEventRequest) -> AppResult<CreatedEvent> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CreatedEvent {
                event_id: format!("evt-{}", n),
                meeting_link: Some(format!("https://meet.example/{}", n)),
            })
        }

        async fn delete_event(&self, _event_id: &str) -> AppResult<()> {
            unreachable!("booking tests never compensate")
        }
    }

    async fn test_app(config: Config) -> (Router, sqlx::SqlitePool) {
        let pool = test_pool().await;
        let gateway: Arc<dyn CalendarGateway> = Arc::new(StubGateway {
            created: AtomicU32::new(0),
        });
        let state = Arc::new(AppState {
            db: pool.clone(),
            availability: AvailabilityCache::new(gateway.clone(), config.availability.clone()),
            guard: Arc::new(InMemoryRequestGuard::new(&config.guard)),
            gateway,
            config,
        });
        let app = Router::new().nest("/bookings", router()).with_state(state);
        (app, pool)
    }

    async fn insert_advisor(pool: &sqlx::SqlitePool, name: &str) {
        sqlx::query(
            r#"
            INSERT INTO advisors (id, name, email, is_active, is_available)
            VALUES (?, ?, ?, 1, 1)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(format!("{}@example.com", name))
        .execute(pool)
        .await
        .unwrap();
    }

    fn booking_body() -> String {
        let date = (Utc::now().date_naive() + chrono::Duration::days(3)).to_string();
        serde_json::json!({
            "requesterName": "Dana Levi",
            "requesterEmail": "dana@example.com",
            "requesterPhone": "0521234567",
            "subjectName": "Tom",
            "subjectAge": 9,
            "date": date,
            "time": "14:00",
        })
        .to_string()
    }

    fn post_booking(body: String) -> Request<Body> {
        Request::post("/bookings")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn booking_count(pool: &sqlx::SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resubmission_short_circuits_to_the_existing_booking() {
        let (app, pool) = test_app(Config::default()).await;
        insert_advisor(&pool, "noa").await;

        let first = app
            .clone()
            .oneshot(post_booking(booking_body()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = json_body(first).await;
        assert_eq!(first["success"], true);
        assert_eq!(first["alreadyBooked"], false);
        assert_eq!(first["assignedAdvisor"], "noa");

        // Same requester, same slot: success-shaped again, no new row.
        let second = app.oneshot(post_booking(booking_body())).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        let second = json_body(second).await;
        assert_eq!(second["success"], true);
        assert_eq!(second["alreadyBooked"], true);
        assert_eq!(second["bookingId"], first["bookingId"]);
        // The response still names the advisor assigned the first time.
        assert_eq!(second["assignedAdvisor"], "noa");

        assert_eq!(booking_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn exhausted_admissions_return_the_rate_limit_envelope() {
        let mut config = Config::default();
        config.guard.booking_limit = 1;
        let (app, pool) = test_app(config).await;
        insert_advisor(&pool, "noa").await;

        let first = app
            .clone()
            .oneshot(post_booking(booking_body()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let denied = app.oneshot(post_booking(booking_body())).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = json_body(denied).await;
        assert_eq!(json["error"]["code"], "RATE_LIMITED");
        assert!(json["error"]["details"]["retry_after_seconds"].as_u64().unwrap() >= 1);

        assert_eq!(booking_count(&pool).await, 1);
    }
}
