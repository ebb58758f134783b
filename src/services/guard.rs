use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::GuardConfig;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub allowed: bool,
    /// Admissions left in the current window.
    pub remaining: u32,
    /// Non-zero only on denial: seconds until the window resets.
    pub retry_after_seconds: u64,
}

/// Per-identity admission control in front of the booking write path.
///
/// Behind a trait so a multi-instance deployment can swap in a shared
/// counter store without changing callers. Best-effort by design: it only
/// needs to be eventually effective, the persistence-level uniqueness
/// constraint is what actually protects the data.
pub trait RequestGuard: Send + Sync {
    fn admit(&self, identity: &str) -> Admission;
}

struct WindowState {
    started_at: Instant,
    count: u32,
}

/// Fixed-window counters keyed by normalized requester identity.
pub struct InMemoryRequestGuard {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, WindowState>>,
}

/// Identity keys are lower-cased, trimmed contact addresses so that casing
/// and stray whitespace do not dodge the limit.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl InMemoryRequestGuard {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            limit: config.booking_limit,
            window: Duration::from_secs(config.booking_window_seconds),
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl RequestGuard for InMemoryRequestGuard {
    fn admit(&self, identity: &str) -> Admission {
        let key = normalize_identity(identity);
        let mut windows = self.windows.lock().expect("guard mutex poisoned");

        // Opportunistic purge so abandoned identities don't accumulate.
        if windows.len() > 1024 {
            let window = self.window;
            windows.retain(|_, state| state.started_at.elapsed() < window);
        }

        let now = Instant::now();
        let state = windows.entry(key).or_insert(WindowState {
            started_at: now,
            count: 0,
        });

        if state.started_at.elapsed() >= self.window {
            state.started_at = now;
            state.count = 0;
        }

        if state.count < self.limit {
            state.count += 1;
            Admission {
                allowed: true,
                remaining: self.limit - state.count,
                retry_after_seconds: 0,
            }
        } else {
            let elapsed = state.started_at.elapsed();
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            Admission {
                allowed: false,
                remaining: 0,
                retry_after_seconds: retry_after,
            }
        }
    }
}
