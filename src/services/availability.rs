use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::AvailabilityConfig;
use crate::error::{AppError, AppResult};
use crate::services::calendar::{CalendarGateway, Slot};

/// Whether a slots answer came straight from the gateway (or a within-TTL
/// cache hit) or from the stale fallback while the gateway was down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotsMode {
    Fresh,
    Stale,
}

/// A slots answer ready for the read endpoint.
#[derive(Debug, Clone)]
pub struct SlotsView {
    pub slots: Vec<Slot>,
    pub total_slots: usize,
    pub total_available: usize,
    pub mode: SlotsMode,
    pub age_seconds: u64,
}

struct Snapshot {
    slots: Vec<Slot>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    fn age_seconds(&self) -> u64 {
        (Utc::now() - self.fetched_at).num_seconds().max(0) as u64
    }
}

/// Read-through cache over the calendar gateway's availability.
///
/// Only the default lookahead window is cached; the snapshot is replaced
/// wholesale under the lock so readers never observe a partial update. When
/// the gateway is unreachable, a snapshot younger than the staleness bound
/// is served with its available count defensively reduced, covering
/// bookings that may have landed since it was taken.
pub struct AvailabilityCache {
    gateway: Arc<dyn CalendarGateway>,
    config: AvailabilityConfig,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl AvailabilityCache {
    pub fn new(gateway: Arc<dyn CalendarGateway>, config: AvailabilityConfig) -> Self {
        Self {
            gateway,
            config,
            snapshot: RwLock::new(None),
        }
    }

    /// Serve candidate slots for a lookahead window of `window_days` days
    /// (the configured default when `None`).
    pub async fn get_slots(&self, window_days: Option<u8>) -> AppResult<SlotsView> {
        let days = window_days.unwrap_or(self.config.default_window_days);
        if !(1..=30).contains(&days) {
            return Err(AppError::Validation(
                "days must be between 1 and 30".to_string(),
            ));
        }

        let is_default_window = days == self.config.default_window_days;

        if is_default_window {
            if let Some(snapshot) = self.current_snapshot().await {
                let age = snapshot.age_seconds();
                if age <= self.config.fresh_ttl_seconds {
                    debug!(age_seconds = age, "Serving slots from fresh cache");
                    return Ok(self.view_of(&snapshot, SlotsMode::Fresh));
                }
            }
        }

        match self.gateway.fetch_slots(days).await {
            Ok(slots) => {
                if is_default_window {
                    self.replace_snapshot(slots.clone()).await;
                }
                Ok(Self::fresh_view(slots))
            }
            Err(err) => {
                warn!("Availability fetch failed: {:?}", err);

                if is_default_window {
                    if let Some(snapshot) = self.current_snapshot().await {
                        if snapshot.age_seconds() <= self.config.stale_max_seconds {
                            warn!(
                                age_seconds = snapshot.age_seconds(),
                                "Serving stale availability snapshot"
                            );
                            return Ok(self.view_of(&snapshot, SlotsMode::Stale));
                        }
                    }
                }

                Err(AppError::Upstream {
                    message: "calendar availability is unreachable and no usable snapshot exists"
                        .to_string(),
                    retry_after_seconds: self.config.retry_after_seconds,
                })
            }
        }
    }

    /// Refresh the default-window snapshot. Called by the background worker;
    /// failures leave the previous snapshot in place.
    pub async fn refresh(&self) -> AppResult<usize> {
        let slots = self
            .gateway
            .fetch_slots(self.config.default_window_days)
            .await?;
        let count = slots.len();
        self.replace_snapshot(slots).await;
        Ok(count)
    }

    async fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().await.clone()
    }

    async fn replace_snapshot(&self, slots: Vec<Slot>) {
        let mut guard = self.snapshot.write().await;
        *guard = Some(Arc::new(Snapshot {
            slots,
            fetched_at: Utc::now(),
        }));
    }

    fn fresh_view(slots: Vec<Slot>) -> SlotsView {
        let total_slots = slots.len();
        let total_available = slots.iter().filter(|s| s.available).count();
        SlotsView {
            slots,
            total_slots,
            total_available,
            mode: SlotsMode::Fresh,
            age_seconds: 0,
        }
    }

    fn view_of(&self, snapshot: &Snapshot, mode: SlotsMode) -> SlotsView {
        let total_slots = snapshot.slots.len();
        let available = snapshot.slots.iter().filter(|s| s.available).count();
        // The count is reduced in stale mode, never the slot list: the
        // margin only tempers expectations, the saga is the real check.
        let total_available = match mode {
            SlotsMode::Fresh => available,
            SlotsMode::Stale => available.saturating_sub(self.config.stale_margin as usize),
        };
        SlotsView {
            slots: snapshot.slots.clone(),
            total_slots,
            total_available,
            mode,
            age_seconds: snapshot.age_seconds(),
        }
    }

    #[cfg(test)]
    pub async fn inject_snapshot_for_tests(&self, slots: Vec<Slot>, age_seconds: i64) {
        let mut guard = self.snapshot.write().await;
        *guard = Some(Arc::new(Snapshot {
            slots,
            fetched_at: Utc::now() - chrono::Duration::seconds(age_seconds),
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::config::Config;
    use crate::services::calendar::{CreateEventRequest, CreatedEvent};

    struct StubGateway {
        fail: AtomicBool,
        fetches: AtomicU32,
    }

    impl StubGateway {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                fetches: AtomicU32::new(0),
            }
        }

        fn slots(available: usize, taken: usize) -> Vec<Slot> {
            let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
            let mut out = Vec::new();
            for i in 0..available + taken {
                out.push(Slot {
                    date,
                    time: format!("{:02}:00", 9 + i),
                    available: i < available,
                });
            }
            out
        }
    }

    #[async_trait]
    impl CalendarGateway for StubGateway {
        async fn fetch_slots(&self, _window_days: u8) -> AppResult<Vec<Slot>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::Upstream {
                    message: "gateway down".to_string(),
                    retry_after_seconds: 60,
                });
            }
            Ok(Self::slots(5, 2))
        }

        async fn create_event(&self, _request: &CreateEventRequest) -> AppResult<CreatedEvent> {
            unreachable!("availability tests never create events")
        }

        async fn delete_event(&self, _event_id: &str) -> AppResult<()> {
            unreachable!("availability tests never delete events")
        }
    }

    fn cache_with(gateway: Arc<StubGateway>) -> AvailabilityCache {
        AvailabilityCache::new(gateway, Config::default().availability)
    }

    #[tokio::test]
    async fn default_window_is_cached_within_ttl() {
        let gateway = Arc::new(StubGateway::new());
        let cache = cache_with(gateway.clone());

        let first = cache.get_slots(None).await.unwrap();
        assert_eq!(first.mode, SlotsMode::Fresh);
        assert_eq!(first.total_available, 5);
        assert_eq!(first.total_slots, 7);

        let second = cache.get_slots(None).await.unwrap();
        assert_eq!(second.mode, SlotsMode::Fresh);
        // Second read must be a cache hit.
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_default_window_bypasses_cache() {
        let gateway = Arc::new(StubGateway::new());
        let cache = cache_with(gateway.clone());

        cache.get_slots(Some(7)).await.unwrap();
        cache.get_slots(Some(7)).await.unwrap();
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gateway_failure_serves_stale_with_margin() {
        let gateway = Arc::new(StubGateway::new());
        let cache = cache_with(gateway.clone());

        cache
            .inject_snapshot_for_tests(StubGateway::slots(5, 2), 600)
            .await;
        gateway.fail.store(true, Ordering::SeqCst);

        let view = cache.get_slots(None).await.unwrap();
        assert_eq!(view.mode, SlotsMode::Stale);
        // Margin of 2 comes off the available count, not the slot list.
        assert_eq!(view.total_available, 3);
        assert_eq!(view.total_slots, 7);
        assert!(view.age_seconds >= 600);
    }

    #[tokio::test]
    async fn gateway_failure_with_expired_snapshot_is_retryable() {
        let gateway = Arc::new(StubGateway::new());
        let cache = cache_with(gateway.clone());

        cache
            .inject_snapshot_for_tests(StubGateway::slots(5, 2), 3600)
            .await;
        gateway.fail.store(true, Ordering::SeqCst);

        let err = cache.get_slots(None).await.unwrap_err();
        match err {
            AppError::Upstream {
                retry_after_seconds,
                ..
            } => assert_eq!(retry_after_seconds, 60),
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn window_out_of_range_is_a_validation_error() {
        let gateway = Arc::new(StubGateway::new());
        let cache = cache_with(gateway.clone());

        for days in [0u8, 31, 45] {
            let err = cache.get_slots(Some(days)).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        // Validation happens before any gateway call.
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_replaces_the_snapshot() {
        let gateway = Arc::new(StubGateway::new());
        let cache = cache_with(gateway.clone());

        let count = cache.refresh().await.unwrap();
        assert_eq!(count, 7);

        let view = cache.get_slots(None).await.unwrap();
        assert_eq!(view.mode, SlotsMode::Fresh);
        // The read was served from the refreshed snapshot.
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
    }
}
