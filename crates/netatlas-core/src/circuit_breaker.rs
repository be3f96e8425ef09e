use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::clock::{duration_ms, Clock, SystemClock};

/// Runtime circuit state for source adapter upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in closed state that open the circuit.
    pub failure_threshold: u32,
    pub open_duration: Duration,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Error returned without running the operation while the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerOpen {
    pub name: String,
    pub retry_at_ms: i64,
}

impl Display for BreakerOpen {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "circuit breaker '{}' is open until {}",
            self.name, self.retry_at_ms
        )
    }
}

impl std::error::Error for BreakerOpen {}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub next_attempt_at_ms: Option<i64>,
    pub failure_threshold: u32,
    pub open_duration_ms: i64,
    pub success_threshold: u32,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_at_ms: Option<i64>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            next_attempt_at_ms: None,
        }
    }
}

/// Thread-safe circuit breaker for adapter network requests.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock("upstream", config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Run `operation` under breaker protection.
    ///
    /// While open, fails with [`BreakerOpen`] (converted into `E`) without
    /// invoking the operation.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BreakerOpen>,
    {
        self.try_acquire().map_err(E::from)?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    pub fn allow_request(&self) -> bool {
        self.try_acquire().is_ok()
    }

    fn try_acquire(&self) -> Result<(), BreakerOpen> {
        let now = self.clock.now_ms();
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");

        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let retry_at_ms = inner.next_attempt_at_ms.unwrap_or(now);
        if now < retry_at_ms {
            return Err(BreakerOpen {
                name: self.name.clone(),
                retry_at_ms,
            });
        }

        inner.state = CircuitState::HalfOpen;
        inner.success_count = 0;
        inner.next_attempt_at_ms = None;
        tracing::info!(breaker = %self.name, "circuit breaker half-open, probing upstream");
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count = inner.success_count.saturating_add(1);
                if inner.success_count >= self.config.success_threshold {
                    *inner = CircuitInner::default();
                    tracing::info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            // A call admitted before another caller tripped the breaker.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now_ms();
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    self.trip(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                self.trip(&mut inner, now);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, inner: &mut CircuitInner, now: i64) {
        let next_attempt = now.saturating_add(duration_ms(self.config.open_duration));
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.next_attempt_at_ms = Some(next_attempt);
        tracing::warn!(
            breaker = %self.name,
            failures = inner.failure_count,
            next_attempt_at_ms = next_attempt,
            "circuit breaker opened"
        );
    }

    /// Force the breaker closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        *inner = CircuitInner::default();
    }

    pub fn state(&self) -> CircuitState {
        self.inner
            .lock()
            .expect("circuit breaker lock is not poisoned")
            .state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            next_attempt_at_ms: inner.next_attempt_at_ms,
            failure_threshold: self.config.failure_threshold,
            open_duration_ms: duration_ms(self.config.open_duration),
            success_threshold: self.config.success_threshold,
        }
    }
}
