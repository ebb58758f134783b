use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub calendar: CalendarConfig,
    pub availability: AvailabilityConfig,
    pub booking: BookingConfig,
    pub guard: GuardConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the public booking form, used for CORS.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// Base URL of the external calendar gateway.
    pub base_url: String,
    /// Bearer token for the gateway, if it requires one.
    pub api_token: Option<String>,
    /// Per-call timeout for gateway requests (seconds). The saga performs
    /// at most two gateway calls, so the end-to-end budget stays bounded.
    pub request_timeout_seconds: u64,
    /// Length of the created intro-call event (minutes).
    pub event_duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityConfig {
    /// Lookahead window served (and cached) when the caller does not ask
    /// for a specific one.
    pub default_window_days: u8,
    /// Snapshot freshness TTL (seconds); within it, default-window reads
    /// are served from cache.
    pub fresh_ttl_seconds: u64,
    /// Upper bound on snapshot age (seconds) for the stale fallback when
    /// the gateway is unreachable.
    pub stale_max_seconds: u64,
    /// How much to knock off `totalAvailable` when serving a stale
    /// snapshot, covering bookings made since it was taken.
    pub stale_margin: u32,
    /// Retry-after hint (seconds) returned when no usable snapshot exists.
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Minimum lead time (minutes) between now and the booked slot.
    pub min_lead_minutes: i64,
    /// Earliest bookable wall-clock time, "HH:MM".
    pub open_time: String,
    /// Latest bookable wall-clock time, "HH:MM".
    pub close_time: String,
    pub min_subject_age: u8,
    pub max_subject_age: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// Booking admissions allowed per identity per window.
    pub booking_limit: u32,
    /// Booking admission window length (seconds).
    pub booking_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained admissions per minute (per IP) for the public /slots
    /// endpoint.
    pub slots_per_minute: u32,
    /// Burst size for the /slots endpoint.
    pub slots_burst: u32,
}

impl RateLimitConfig {
    /// Token replenish interval for the governor, derived from the
    /// per-minute rate so sustained throughput matches it exactly.
    pub fn replenish_interval_ms(&self) -> u64 {
        60_000 / u64::from(self.slots_per_minute.max(1))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/bookings.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            calendar: CalendarConfig {
                base_url: env::var("CALENDAR_BASE_URL")
                    .map_err(|_| ConfigError::MissingEnv("CALENDAR_BASE_URL".to_string()))?,
                api_token: env::var("CALENDAR_API_TOKEN").ok(),
                request_timeout_seconds: env::var("CALENDAR_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                event_duration_minutes: env::var("CALENDAR_EVENT_DURATION_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            availability: AvailabilityConfig {
                default_window_days: env::var("AVAILABILITY_DEFAULT_WINDOW_DAYS")
                    .unwrap_or_else(|_| "14".to_string())
                    .parse()
                    .unwrap_or(14),
                fresh_ttl_seconds: env::var("AVAILABILITY_FRESH_TTL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                stale_max_seconds: env::var("AVAILABILITY_STALE_MAX_SECONDS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
                stale_margin: env::var("AVAILABILITY_STALE_MARGIN")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                retry_after_seconds: env::var("AVAILABILITY_RETRY_AFTER_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            booking: BookingConfig {
                min_lead_minutes: env::var("BOOKING_MIN_LEAD_MINUTES")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
                open_time: env::var("BOOKING_OPEN_TIME").unwrap_or_else(|_| "09:00".to_string()),
                close_time: env::var("BOOKING_CLOSE_TIME").unwrap_or_else(|_| "20:00".to_string()),
                min_subject_age: env::var("BOOKING_MIN_SUBJECT_AGE")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                max_subject_age: env::var("BOOKING_MAX_SUBJECT_AGE")
                    .unwrap_or_else(|_| "18".to_string())
                    .parse()
                    .unwrap_or(18),
            },
            guard: GuardConfig {
                booking_limit: env::var("GUARD_BOOKING_LIMIT")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                booking_window_seconds: env::var("GUARD_BOOKING_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            },
            rate_limit: RateLimitConfig {
                slots_per_minute: env::var("RATE_LIMIT_SLOTS_PER_MINUTE")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                slots_burst: env::var("RATE_LIMIT_SLOTS_BURST")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/bookings.db".to_string(),
                max_connections: 5,
            },
            calendar: CalendarConfig {
                base_url: "http://localhost:9000".to_string(),
                api_token: None,
                request_timeout_seconds: 10,
                event_duration_minutes: 30,
            },
            availability: AvailabilityConfig {
                default_window_days: 14,
                fresh_ttl_seconds: 300,
                stale_max_seconds: 1800,
                stale_margin: 2,
                retry_after_seconds: 60,
            },
            booking: BookingConfig {
                min_lead_minutes: 15,
                open_time: "09:00".to_string(),
                close_time: "20:00".to_string(),
                min_subject_age: 3,
                max_subject_age: 18,
            },
            guard: GuardConfig {
                booking_limit: 3,
                booking_window_seconds: 3600,
            },
            rate_limit: RateLimitConfig {
                slots_per_minute: 30,
                slots_burst: 30,
            },
        }
    }
}
