//! Top-level entry point tying adapters, cache and fallback together.
//!
//! Every dataset request walks the same chain and stops at the first rung
//! that yields data:
//!
//! | Rung | Condition | Result tagging |
//! |------|-----------|----------------|
//! | cache | entry present, within rule TTL, not a fallback | `cached`, confidence kept |
//! | live | adapter fetch succeeds | `live`, adapter confidence |
//! | stale cache | any retained entry | `stale`, confidence -0.2 (floor 0.4) |
//! | fallback | always | `static`, confidence 0.5 |
//!
//! Concurrent identical requests share a single live fetch.

mod attempts;
mod builder;
mod refresh;
mod stats;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

pub use attempts::{AttemptSource, SourceAttempt, SourceAttemptLog};
pub use builder::OrchestratorBuilder;
pub use stats::Statistics;

use self::refresh::RefreshTimers;
use self::stats::{Counter, Counters};
use crate::cache::{RevalidateTrigger, TieredCache};
use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::data_source::{AdapterHealth, DataSource, SourceError};
use crate::dedup::RequestDeduplicator;
use crate::events::{BroadcastListener, RevalidationEvent, RevalidationListener};
use crate::fallback::FallbackSource;
use crate::{DataResult, DatasetKind, Freshness, QueryParams, ResultSource};

/// Confidence subtracted from a cached result served after a live failure.
pub const STALE_CONFIDENCE_PENALTY: f64 = 0.2;
/// Lowest confidence a stale result can drop to.
pub const STALE_CONFIDENCE_FLOOR: f64 = 0.4;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestratorError {
    /// The terminal fallback source failed; nothing could be served.
    #[error("fallback source failed for dataset '{kind}': {reason}")]
    FallbackFailed { kind: DatasetKind, reason: String },
}

/// Cache key of a dataset request: `"<kind>:<serialized query>"`.
pub fn cache_key(kind: DatasetKind, query: &QueryParams) -> String {
    format!("{}:{}", kind.as_str(), query.serialize())
}

/// What was last served for a dataset kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FreshnessRecord {
    pub last_source: ResultSource,
    pub last_freshness: Freshness,
    pub last_confidence: f64,
    pub last_served_at_ms: i64,
    /// Time of the most recent successful live fetch, if any.
    pub last_live_success_ms: Option<i64>,
}

/// Every dataset kind, each settled independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfrastructureSnapshot {
    pub datasets: BTreeMap<DatasetKind, DataResult>,
    /// Mean confidence over non-empty kinds; 0 when all are empty.
    pub confidence: f64,
}

impl InfrastructureSnapshot {
    pub fn get(&self, kind: DatasetKind) -> Option<&DataResult> {
        self.datasets.get(&kind)
    }
}

/// Resilient front door over all registered data sources.
///
/// Build with [`OrchestratorBuilder`]. The orchestrator is shared behind an
/// [`Arc`] so auto-refresh tasks can hold weak references to it.
pub struct DataOrchestrator {
    adapters: HashMap<DatasetKind, Arc<dyn DataSource>>,
    cache: Option<TieredCache>,
    fallback: Arc<dyn FallbackSource>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    live_dedup: Arc<RequestDeduplicator<DataResult, SourceError>>,
    counters: Arc<Counters>,
    attempt_logs: Mutex<HashMap<DatasetKind, SourceAttemptLog>>,
    freshness: Mutex<HashMap<DatasetKind, FreshnessRecord>>,
    listener: Mutex<Option<Arc<dyn RevalidationListener>>>,
    broadcast: Mutex<Option<BroadcastListener>>,
    timers: RefreshTimers,
}

impl DataOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Shared cache, absent when caching is disabled.
    pub fn cache(&self) -> Option<&TieredCache> {
        self.cache.as_ref()
    }

    /// Adapter registered for `kind`.
    pub fn adapter_for(&self, kind: DatasetKind) -> Option<&Arc<dyn DataSource>> {
        self.adapters.get(&kind)
    }

    /// Fetch `kind` through the fallback chain.
    ///
    /// Only fails when every rung, including the fallback source, fails.
    pub async fn get_dataset(
        &self,
        kind: DatasetKind,
        query: &QueryParams,
    ) -> Result<DataResult, OrchestratorError> {
        let key = cache_key(kind, query);
        let mut log = SourceAttemptLog::new(kind, self.clock.now_ms());
        self.counters.incr(Counter::Requests);

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Some(cached)
                    if cached.metadata.source != ResultSource::Fallback
                        && !cache.strategy().is_stale(&key, &cached, self.clock.now_ms()) =>
                {
                    self.counters.incr(Counter::CacheHits);
                    log.succeeded(AttemptSource::Cache);
                    tracing::debug!(dataset = %kind, key = %key, "cache hit");
                    let result = cached.as_cached();
                    self.finish(kind, log, &result);
                    return Ok(result);
                }
                Some(_) => {
                    self.counters.incr(Counter::CacheMisses);
                    log.failed(AttemptSource::Cache, "entry is stale");
                }
                None => {
                    self.counters.incr(Counter::CacheMisses);
                    log.failed(AttemptSource::Cache, "no entry");
                }
            }
        }

        let error = match self.adapters.get(&kind) {
            Some(adapter) => {
                let provider = adapter.id();
                let live = self.live_fetch(Arc::clone(adapter), kind, query.clone(), key.clone());
                match live.await {
                    Ok(result) => {
                        log.succeeded(AttemptSource::LiveApi(provider));
                        tracing::debug!(dataset = %kind, %provider, records = result.data.len(), "live fetch succeeded");
                        self.finish(kind, log, &result);
                        return Ok(result);
                    }
                    Err(error) => {
                        log.failed(AttemptSource::LiveApi(provider), error.to_string());
                        tracing::warn!(dataset = %kind, %provider, %error, "live fetch failed");
                        error
                    }
                }
            }
            None => SourceError::invalid_request(format!(
                "no live source registered for dataset '{kind}'"
            )),
        };

        self.counters.incr(Counter::Errors);
        self.degrade(kind, query, &key, error, log).await
    }

    pub async fn get_cables(&self, query: &QueryParams) -> Result<DataResult, OrchestratorError> {
        self.get_dataset(DatasetKind::Cables, query).await
    }

    pub async fn get_exchange_points(
        &self,
        query: &QueryParams,
    ) -> Result<DataResult, OrchestratorError> {
        self.get_dataset(DatasetKind::ExchangePoints, query).await
    }

    pub async fn get_data_centers(
        &self,
        query: &QueryParams,
    ) -> Result<DataResult, OrchestratorError> {
        self.get_dataset(DatasetKind::DataCenters, query).await
    }

    pub async fn get_attack_telemetry(
        &self,
        query: &QueryParams,
    ) -> Result<DataResult, OrchestratorError> {
        self.get_dataset(DatasetKind::AttackTelemetry, query).await
    }

    /// All four kinds concurrently. A kind that fails outright is reported
    /// as an empty result instead of failing the whole call.
    pub async fn get_all_infrastructure(&self, query: &QueryParams) -> InfrastructureSnapshot {
        let settled = join_all(
            DatasetKind::ALL
                .into_iter()
                .map(|kind| async move { (kind, self.get_dataset(kind, query).await) }),
        )
        .await;

        let now = self.clock.now_ms();
        let datasets: BTreeMap<DatasetKind, DataResult> = settled
            .into_iter()
            .map(|(kind, outcome)| {
                let result = outcome.unwrap_or_else(|error| {
                    tracing::error!(dataset = %kind, %error, "dataset unavailable");
                    DataResult::empty(now).with_fallback_reason(error.to_string())
                });
                (kind, result)
            })
            .collect();

        let confidences: Vec<f64> = datasets
            .values()
            .map(|result| result.metadata.confidence)
            .filter(|confidence| *confidence > 0.0)
            .collect();
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            crate::result::round_confidence(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        InfrastructureSnapshot {
            datasets,
            confidence,
        }
    }

    /// Refetch the default query of `kind`, then invalidate every other
    /// cached query of the kind.
    ///
    /// Retained entries are only dropped once the live fetch succeeds, so a
    /// refresh during an outage still leaves the stale rung to serve from.
    pub async fn refresh(&self, kind: DatasetKind) -> Result<DataResult, OrchestratorError> {
        self.refresh_with(kind, RevalidateTrigger::ManualRefresh).await
    }

    pub(crate) async fn refresh_with(
        &self,
        kind: DatasetKind,
        trigger: RevalidateTrigger,
    ) -> Result<DataResult, OrchestratorError> {
        let query = QueryParams::new();
        let prefix = format!("{}:", kind.as_str());
        let Some(cache) = self
            .cache
            .as_ref()
            .filter(|cache| cache.strategy().accepts(&prefix, trigger))
        else {
            tracing::debug!(dataset = %kind, ?trigger, "no invalidation for trigger, keeping cache");
            return self.get_dataset(kind, &query).await;
        };
        let Some(adapter) = self.adapters.get(&kind) else {
            let removed = cache.delete_prefix(&prefix).await;
            tracing::info!(dataset = %kind, ?trigger, removed, "invalidated cached dataset");
            return self.get_dataset(kind, &query).await;
        };

        let key = cache_key(kind, &query);
        let mut log = SourceAttemptLog::new(kind, self.clock.now_ms());
        self.counters.incr(Counter::Requests);

        let provider = adapter.id();
        let live = self.live_fetch(Arc::clone(adapter), kind, query.clone(), key.clone());
        match live.await {
            Ok(result) => {
                let removed = cache.delete_prefix(&prefix).await;
                cache.set(&key, result.clone(), None, true).await;
                tracing::info!(dataset = %kind, ?trigger, removed, "refreshed cached dataset");
                log.succeeded(AttemptSource::LiveApi(provider));
                self.finish(kind, log, &result);
                Ok(result)
            }
            Err(error) => {
                log.failed(AttemptSource::LiveApi(provider), error.to_string());
                tracing::warn!(dataset = %kind, ?trigger, %error, "refresh failed, keeping cache");
                self.counters.incr(Counter::Errors);
                self.degrade(kind, &query, &key, error, log).await
            }
        }
    }

    /// Serve cached data immediately and revalidate it in the background
    /// once past its rule TTL. Revalidated data is announced to the
    /// registered listener.
    pub async fn get_revalidating(
        &self,
        kind: DatasetKind,
        query: &QueryParams,
    ) -> Result<DataResult, OrchestratorError> {
        let (Some(cache), Some(adapter)) = (&self.cache, self.adapters.get(&kind)) else {
            return self.get_dataset(kind, query).await;
        };

        let key = cache_key(kind, query);
        let started = self.clock.now_ms();
        let mut log = SourceAttemptLog::new(kind, started);
        self.counters.incr(Counter::Requests);

        let provider = adapter.id();
        let live = self.live_fetch(Arc::clone(adapter), kind, query.clone(), key.clone());
        let listener = self
            .listener
            .lock()
            .expect("listener slot is not poisoned")
            .clone();
        let fetched = Arc::new(AtomicBool::new(false));
        let fetch_started = Arc::clone(&fetched);
        let fetcher = move || {
            fetch_started.store(true, Ordering::SeqCst);
            live
        };

        match cache.stale_while_revalidate(&key, fetcher, listener).await {
            Ok(result) => {
                let stale = cache.strategy().is_stale(&key, &result, self.clock.now_ms());
                // A fetch that ran for a stale entry is the background refresh;
                // the caller still receives the cached value.
                let result = if fetched.load(Ordering::SeqCst) && !stale {
                    log.succeeded(AttemptSource::LiveApi(provider));
                    result
                } else if stale {
                    self.counters.incr(Counter::CacheHits);
                    log.succeeded(AttemptSource::StaleCache);
                    result.as_stale(0.0, 0.0)
                } else {
                    self.counters.incr(Counter::CacheHits);
                    log.succeeded(AttemptSource::Cache);
                    result.as_cached()
                };
                self.finish(kind, log, &result);
                Ok(result)
            }
            Err(error) => {
                log.failed(AttemptSource::LiveApi(provider), error.to_string());
                tracing::warn!(dataset = %kind, %provider, %error, "revalidating fetch failed");
                self.counters.incr(Counter::Errors);
                self.degrade(kind, query, &key, error, log).await
            }
        }
    }

    /// Attempts made by the most recent completed call for `kind`.
    pub fn attempt_log(&self, kind: DatasetKind) -> Option<SourceAttemptLog> {
        self.attempt_logs
            .lock()
            .expect("attempt logs are not poisoned")
            .get(&kind)
            .cloned()
    }

    pub fn freshness(&self, kind: DatasetKind) -> Option<FreshnessRecord> {
        self.freshness
            .lock()
            .expect("freshness map is not poisoned")
            .get(&kind)
            .copied()
    }

    pub fn statistics(&self) -> Statistics {
        self.counters
            .snapshot(self.cache.as_ref().map(TieredCache::stats))
    }

    /// Zero the request counters. The memory tier's hit, miss, eviction and
    /// rejection counters are zeroed too, so both report from the same start.
    pub fn reset_statistics(&self) {
        self.counters.reset();
        if let Some(cache) = &self.cache {
            cache.memory().reset_stats();
        }
    }

    /// Health of every registered adapter, one entry per provider.
    pub async fn health(&self) -> Vec<AdapterHealth> {
        let mut providers: BTreeMap<_, &Arc<dyn DataSource>> = BTreeMap::new();
        for adapter in self.adapters.values() {
            providers.entry(adapter.id()).or_insert(adapter);
        }

        join_all(providers.into_values().map(|adapter| adapter.health())).await
    }

    /// Receiver of background revalidation events, when the default
    /// broadcast listener is in use.
    pub fn subscribe_revalidations(&self) -> Option<broadcast::Receiver<RevalidationEvent>> {
        self.broadcast
            .lock()
            .expect("broadcast slot is not poisoned")
            .as_ref()
            .map(BroadcastListener::subscribe)
    }

    /// Start a recurring refresh of `kind` every configured interval.
    /// Must be called from within a tokio runtime.
    pub fn start_auto_refresh(self: &Arc<Self>, kind: DatasetKind) {
        self.timers
            .start(Arc::downgrade(self), kind, self.config.refresh_interval);
        tracing::info!(dataset = %kind, interval = ?self.config.refresh_interval, "auto-refresh started");
    }

    pub fn cancel_auto_refresh(&self, kind: DatasetKind) -> bool {
        self.timers.cancel(kind)
    }

    pub fn auto_refresh_kinds(&self) -> Vec<DatasetKind> {
        self.timers.active()
    }

    /// Stop timers, drop freshness tracking and the listener. Cached data
    /// is kept.
    pub fn destroy(&self) {
        let cancelled = self.timers.cancel_all();
        self.freshness
            .lock()
            .expect("freshness map is not poisoned")
            .clear();
        *self.listener.lock().expect("listener slot is not poisoned") = None;
        *self.broadcast.lock().expect("broadcast slot is not poisoned") = None;
        tracing::info!(cancelled, "orchestrator destroyed");
    }

    /// Live fetch of `kind`, shared by concurrent callers of the same key.
    /// The fetched result is written to the cache before it settles.
    fn live_fetch(
        &self,
        adapter: Arc<dyn DataSource>,
        kind: DatasetKind,
        query: QueryParams,
        key: String,
    ) -> impl Future<Output = Result<DataResult, SourceError>> + Send + 'static {
        let dedup = Arc::clone(&self.live_dedup);
        let counters = Arc::clone(&self.counters);
        let cache = self.cache.clone();

        async move {
            let cache_key = key.clone();
            dedup
                .deduplicate(key, move || async move {
                    counters.incr(Counter::LiveCalls);
                    let result = adapter.fetch(kind, &query).await?;
                    if let Some(cache) = cache {
                        cache.set(&cache_key, result.clone(), None, true).await;
                    }
                    Ok(result)
                })
                .await
        }
    }

    /// Stale cache, then the fallback source.
    async fn degrade(
        &self,
        kind: DatasetKind,
        query: &QueryParams,
        key: &str,
        error: SourceError,
        mut log: SourceAttemptLog,
    ) -> Result<DataResult, OrchestratorError> {
        if let Some(cache) = &self.cache {
            match cache.get(key).await {
                Some(previous) if previous.metadata.source == ResultSource::Fallback => {
                    self.counters.incr(Counter::Fallbacks);
                    log.succeeded(AttemptSource::Fallback);
                    tracing::debug!(dataset = %kind, "reusing cached fallback data");
                    self.finish(kind, log, &previous);
                    return Ok(previous);
                }
                Some(previous) => {
                    let stale = previous.as_stale(STALE_CONFIDENCE_PENALTY, STALE_CONFIDENCE_FLOOR);
                    self.counters.incr(Counter::StaleServes);
                    log.succeeded(AttemptSource::StaleCache);
                    tracing::warn!(
                        dataset = %kind,
                        age_ms = previous.age_ms(self.clock.now_ms()),
                        confidence = stale.metadata.confidence,
                        "serving stale cache"
                    );
                    self.finish(kind, log, &stale);
                    return Ok(stale);
                }
                None => log.failed(AttemptSource::StaleCache, "no retained entry"),
            }
        }

        match self.fallback.generate(kind, query, self.clock.now_ms()) {
            Ok(result) => {
                let result = result.with_fallback_reason(error.message());
                self.counters.incr(Counter::Fallbacks);
                log.succeeded(AttemptSource::Fallback);
                tracing::warn!(dataset = %kind, reason = %error, "serving fallback data");

                if let Some(cache) = &self.cache {
                    cache
                        .set(key, result.clone(), Some(self.config.fallback_cache_ttl), true)
                        .await;
                }
                self.finish(kind, log, &result);
                Ok(result)
            }
            Err(fallback_error) => {
                log.failed(AttemptSource::Fallback, fallback_error.to_string());
                self.publish_log(kind, log);
                let error = OrchestratorError::FallbackFailed {
                    kind,
                    reason: fallback_error.to_string(),
                };
                tracing::error!(dataset = %kind, %error, "all sources failed");
                Err(error)
            }
        }
    }

    fn finish(&self, kind: DatasetKind, log: SourceAttemptLog, result: &DataResult) {
        let now = self.clock.now_ms();
        {
            let mut freshness = self
                .freshness
                .lock()
                .expect("freshness map is not poisoned");
            let previous_live = freshness
                .get(&kind)
                .and_then(|record| record.last_live_success_ms);
            let live_now = matches!(log.served_by(), Some(AttemptSource::LiveApi(_)));

            freshness.insert(
                kind,
                FreshnessRecord {
                    last_source: result.metadata.source,
                    last_freshness: result.metadata.freshness,
                    last_confidence: result.metadata.confidence,
                    last_served_at_ms: now,
                    last_live_success_ms: if live_now { Some(now) } else { previous_live },
                },
            );
        }
        self.publish_log(kind, log);
    }

    fn publish_log(&self, kind: DatasetKind, log: SourceAttemptLog) {
        self.attempt_logs
            .lock()
            .expect("attempt logs are not poisoned")
            .insert(kind, log);
    }
}
