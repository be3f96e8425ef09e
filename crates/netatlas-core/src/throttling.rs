use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::clock::{duration_ms, Clock, SystemClock};
use crate::data_source::SourceError;
use crate::provider_policy::ProviderPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start_ms: i64,
    used: u32,
}

/// Per-adapter call budget.
///
/// A token counter that resets every rolling window backs the health report;
/// a `governor` limiter with the same quota smooths bursts inside a window.
pub struct RateBudget {
    window: Duration,
    limit: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<WindowState>,
    limiter: DirectRateLimiter,
}

impl RateBudget {
    pub fn new(window: Duration, limit: u32, clock: Arc<dyn Clock>) -> Self {
        let limit = limit.max(1);
        let now = clock.now_ms();
        Self {
            window,
            limit,
            clock,
            state: Mutex::new(WindowState {
                window_start_ms: now,
                used: 0,
            }),
            limiter: RateLimiter::direct(quota_from_window(window, limit)),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::new(policy.quota_window, policy.quota_limit, clock)
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::from_secs(1), u32::MAX, Arc::new(SystemClock))
    }

    /// Consume one token or fail with a retryable rate-limit error.
    pub fn try_acquire(&self) -> Result<(), SourceError> {
        let now = self.clock.now_ms();
        let mut state = self
            .state
            .lock()
            .expect("rate budget state should not be poisoned");
        self.roll_window(&mut state, now);

        if state.used >= self.limit {
            let resets_at = state.window_start_ms.saturating_add(duration_ms(self.window));
            return Err(SourceError::rate_limited(format!(
                "local rate budget of {} calls exhausted until {resets_at}",
                self.limit
            )));
        }

        if self.limiter.check().is_err() {
            return Err(SourceError::rate_limited("request burst exceeds rate quota"));
        }

        state.used = state.used.saturating_add(1);
        Ok(())
    }

    pub fn remaining(&self) -> u32 {
        let now = self.clock.now_ms();
        let mut state = self
            .state
            .lock()
            .expect("rate budget state should not be poisoned");
        self.roll_window(&mut state, now);
        self.limit.saturating_sub(state.used)
    }

    pub fn resets_at_ms(&self) -> i64 {
        let state = self
            .state
            .lock()
            .expect("rate budget state should not be poisoned");
        state.window_start_ms.saturating_add(duration_ms(self.window))
    }

    fn roll_window(&self, state: &mut WindowState, now: i64) {
        if now.saturating_sub(state.window_start_ms) >= duration_ms(self.window) {
            state.window_start_ms = now;
            state.used = 0;
        }
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = NonZeroU32::new(quota_limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell =
        (quota_window.as_secs_f64() / f64::from(safe_limit.get())).max(0.000_001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(safe_limit))
        .allow_burst(safe_limit)
}
