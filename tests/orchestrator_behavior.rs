//! Behavior-driven tests for the orchestrator's fallback chain.
//!
//! These tests verify WHAT a caller receives when upstreams succeed, fail or
//! are slow: which rung served the data, how it is tagged and how much
//! confidence it carries.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netatlas_core::circuit_breaker::CircuitBreaker;
use netatlas_core::{
    cache_key, AdapterHealth, AttemptSource, CableCatalogAdapter, DataOrchestrator, DataResult,
    Clock, DataSource, DatasetKind, FallbackDataSource, FallbackSource, Freshness, HealthState,
    HttpClient, HttpError, HttpRequest, HttpResponse, ManualClock, OrchestratorBuilder,
    OrchestratorConfig, ProviderId, ProviderPolicy, QueryParams, Record, ResultSource,
    RetryPolicy, SourceError, SourceFuture,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Test doubles
// =============================================================================

/// Live source whose outcome can be flipped between calls.
struct ScriptedSource {
    provider: ProviderId,
    kinds: &'static [DatasetKind],
    confidence: f64,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicUsize,
    clock: ManualClock,
}

impl ScriptedSource {
    fn cables(clock: &ManualClock) -> Arc<Self> {
        Self::build(ProviderId::TeleGeography, &[DatasetKind::Cables], 0.95, clock)
    }

    fn attacks(clock: &ManualClock, confidence: f64) -> Arc<Self> {
        Self::build(
            ProviderId::CloudflareRadar,
            &[DatasetKind::AttackTelemetry],
            confidence,
            clock,
        )
    }

    fn build(
        provider: ProviderId,
        kinds: &'static [DatasetKind],
        confidence: f64,
        clock: &ManualClock,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            kinds,
            confidence,
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            clock: clock.clone(),
        })
    }

    fn slow(clock: &ManualClock, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            provider: ProviderId::TeleGeography,
            kinds: &[DatasetKind::Cables],
            confidence: 0.95,
            delay,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            clock: clock.clone(),
        })
    }

    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataSource for ScriptedSource {
    fn id(&self) -> ProviderId {
        self.provider
    }

    fn datasets(&self) -> &'static [DatasetKind] {
        self.kinds
    }

    fn fetch<'a>(&'a self, kind: DatasetKind, _query: &'a QueryParams) -> SourceFuture<'a, DataResult> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::from_status(503, "upstream down"));
            }
            let record = Record::new(format!("live-{call}"), "Live record", kind)
                .stamped(self.confidence, Freshness::Live, false);
            Ok(DataResult::live(
                vec![record],
                self.provider,
                self.confidence,
                self.clock.now_ms(),
            ))
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = AdapterHealth> + Send + 'a>> {
        Box::pin(async move {
            AdapterHealth {
                provider: self.provider,
                state: HealthState::Healthy,
                breaker: CircuitBreaker::default().snapshot(),
                rate_tokens_remaining: 100,
                rate_window_resets_at_ms: 0,
            }
        })
    }
}

/// Fallback source that refuses one dataset kind.
struct PartialFallback {
    broken: DatasetKind,
    inner: FallbackDataSource,
}

impl FallbackSource for PartialFallback {
    fn generate(
        &self,
        kind: DatasetKind,
        query: &QueryParams,
        now_ms: i64,
    ) -> Result<DataResult, SourceError> {
        if kind == self.broken {
            return Err(SourceError::internal("catalog unavailable"));
        }
        self.inner.generate(kind, query, now_ms)
    }
}

struct StaticHttpClient {
    response: HttpResponse,
}

impl HttpClient for StaticHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = self.response.clone();
        Box::pin(async move { Ok(response) })
    }
}

fn orchestrator_with(clock: &ManualClock, adapters: Vec<Arc<dyn DataSource>>) -> Arc<DataOrchestrator> {
    let mut builder = OrchestratorBuilder::new()
        .with_config(OrchestratorConfig::in_memory())
        .with_clock(Arc::new(clock.clone()))
        .with_fallback(Arc::new(FallbackDataSource::catalog_only()));
    for adapter in adapters {
        builder = builder.with_adapter(adapter);
    }
    builder.build().expect("orchestrator should build")
}

// =============================================================================
// Fallback chain
// =============================================================================

#[tokio::test]
async fn when_live_source_fails_without_cache_fallback_data_is_served_at_half_confidence() {
    // Given: A cable source that is down and an empty cache
    let clock = ManualClock::new(1_000);
    let source = ScriptedSource::cables(&clock);
    source.fail();
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);

    // When: Cables are requested
    let result = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("fallback never fails");

    // Then: Fallback data is returned, tagged static with confidence 0.5
    assert_eq!(result.metadata.source, ResultSource::Fallback);
    assert_eq!(result.metadata.freshness, Freshness::Static);
    assert_eq!(result.metadata.confidence, 0.5);
    assert!(!result.data.is_empty());
    assert!(result
        .metadata
        .fallback_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("upstream down")));
    for record in &result.data {
        assert!(record.estimated);
        assert_eq!(record.confidence, 0.5);
    }
}

#[tokio::test]
async fn when_live_source_fails_after_a_successful_fetch_stale_data_is_served_with_penalty() {
    // Given: A cable catalog fetched successfully, then past its 30-day TTL
    let clock = ManualClock::new(1_000);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    let original = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("live");
    assert_eq!(original.metadata.source, ResultSource::Live(ProviderId::TeleGeography));

    clock.advance(DAY * 31);
    source.fail();

    // When: Cables are requested again
    let stale = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("stale");

    // Then: The retained data is served as stale with confidence lowered by 0.2
    assert_eq!(stale.metadata.source, ResultSource::StaleCache);
    assert_eq!(stale.metadata.freshness, Freshness::Stale);
    assert_eq!(stale.metadata.confidence, 0.75);
    assert_eq!(stale.metadata.stale_since_ms, Some(1_000));
    assert_eq!(stale.data, original.data);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn when_stale_penalty_would_drop_below_floor_confidence_stops_at_point_four() {
    // Given: Attack telemetry fetched at confidence 0.5, then past its 60s TTL
    let clock = ManualClock::new(0);
    let source = ScriptedSource::attacks(&clock, 0.5);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator
        .get_attack_telemetry(&QueryParams::new())
        .await
        .expect("live");

    clock.advance(Duration::from_secs(120));
    source.fail();

    // When: Telemetry is requested again
    let stale = orchestrator
        .get_attack_telemetry(&QueryParams::new())
        .await
        .expect("stale");

    // Then: Confidence is floored at 0.4
    assert_eq!(stale.metadata.source, ResultSource::StaleCache);
    assert_eq!(stale.metadata.confidence, 0.4);
}

#[tokio::test]
async fn when_data_is_fresh_in_cache_live_source_is_not_called() {
    // Given: Cables fetched once
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");

    // When: The same query is repeated within the TTL
    clock.advance(Duration::from_secs(60));
    let cached = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("cached");

    // Then: The cache answers and keeps the original confidence
    assert_eq!(cached.metadata.source, ResultSource::Cache);
    assert_eq!(cached.metadata.freshness, Freshness::Cached);
    assert_eq!(cached.metadata.confidence, 0.95);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn when_no_adapter_is_registered_for_a_kind_fallback_serves_it() {
    // Given: An orchestrator with no live sources
    let clock = ManualClock::new(0);
    let orchestrator = orchestrator_with(&clock, Vec::new());

    // When: Data centers in Germany are requested
    let result = orchestrator
        .get_data_centers(&QueryParams::new().with("country", "de"))
        .await
        .expect("fallback");

    // Then: Only German catalog entries are returned
    assert_eq!(result.metadata.source, ResultSource::Fallback);
    assert!(!result.data.is_empty());
    assert!(result
        .data
        .iter()
        .all(|record| record.country.as_deref() == Some("DE")));
}

#[tokio::test]
async fn when_fallback_is_cached_next_call_still_attempts_live_recovery() {
    // Given: A failed live fetch that was answered by the fallback
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    source.fail();
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("fallback");

    // When: The source recovers and cables are requested again
    source.failing.store(false, Ordering::SeqCst);
    let recovered = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("live");

    // Then: Live data replaces the fallback
    assert_eq!(recovered.metadata.source, ResultSource::Live(ProviderId::TeleGeography));
    assert_eq!(source.calls(), 2);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_three_identical_requests_race_the_adapter_is_invoked_once() {
    // Given: A slow cable source
    let clock = ManualClock::new(0);
    let source = ScriptedSource::slow(&clock, Duration::from_millis(500));
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    let query = QueryParams::new().with("limit", "10");

    // When: Three callers request the same query concurrently
    let (first, second, third) = tokio::join!(
        orchestrator.get_cables(&query),
        orchestrator.get_cables(&query),
        orchestrator.get_cables(&query),
    );

    // Then: One upstream call serves all three with identical results
    assert_eq!(source.calls(), 1);
    let first = first.expect("first");
    assert_eq!(second.expect("second"), first);
    assert_eq!(third.expect("third"), first);
}

#[tokio::test]
async fn when_one_kind_fails_entirely_get_all_infrastructure_still_returns_the_others() {
    // Given: No live sources and a fallback that cannot produce attack data
    let clock = ManualClock::new(0);
    let orchestrator = OrchestratorBuilder::new()
        .with_config(OrchestratorConfig::in_memory())
        .with_clock(Arc::new(clock.clone()))
        .with_fallback(Arc::new(PartialFallback {
            broken: DatasetKind::AttackTelemetry,
            inner: FallbackDataSource::catalog_only(),
        }))
        .build()
        .expect("orchestrator");

    // When: Every kind is requested at once
    let snapshot = orchestrator.get_all_infrastructure(&QueryParams::new()).await;

    // Then: The failing kind is empty and the rest are fallback data
    let attacks = snapshot.get(DatasetKind::AttackTelemetry).expect("attacks entry");
    assert!(attacks.is_empty());
    assert_eq!(attacks.metadata.confidence, 0.0);
    assert!(attacks.metadata.fallback_reason.is_some());

    for kind in [DatasetKind::Cables, DatasetKind::ExchangePoints, DatasetKind::DataCenters] {
        let result = snapshot.get(kind).expect("kind entry");
        assert_eq!(result.metadata.source, ResultSource::Fallback);
        assert!(!result.is_empty());
    }
    assert_eq!(snapshot.confidence, 0.5);
}

// =============================================================================
// Lifecycle, diagnostics and statistics
// =============================================================================

#[tokio::test]
async fn when_all_live_sources_fail_attempt_log_lists_every_rung() {
    // Given: A failing cable source and an empty cache
    let clock = ManualClock::new(42);
    let source = ScriptedSource::cables(&clock);
    source.fail();
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);

    // When: Cables are requested
    orchestrator.get_cables(&QueryParams::new()).await.expect("fallback");

    // Then: The log shows each rung in order, ending with the fallback
    let log = orchestrator.attempt_log(DatasetKind::Cables).expect("log");
    let sources: Vec<AttemptSource> = log.attempts.iter().map(|attempt| attempt.source).collect();
    assert_eq!(
        sources,
        vec![
            AttemptSource::Cache,
            AttemptSource::LiveApi(ProviderId::TeleGeography),
            AttemptSource::StaleCache,
            AttemptSource::Fallback,
        ]
    );
    assert!(log.attempts[1]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("upstream down")));
    assert_eq!(log.served_by(), Some(AttemptSource::Fallback));
    assert_eq!(log.started_at_ms, 42);
}

#[tokio::test]
async fn statistics_track_hits_misses_and_reset() {
    // Given: One miss followed by one hit
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");
    orchestrator.get_cables(&QueryParams::new()).await.expect("cached");

    // When: Statistics are read
    let stats = orchestrator.statistics();

    // Then: Counters and rates reflect the two calls
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.live_calls, 1);
    assert_eq!(stats.fallbacks, 0);
    assert_eq!(stats.hit_rate, 50.0);
    assert!(stats.cache.is_some());

    orchestrator.reset_statistics();
    let stats = orchestrator.statistics();
    assert_eq!(stats.requests, 0);
    assert_eq!(stats.hit_rate, 0.0);
    let memory = stats.cache.expect("cache enabled").memory;
    assert_eq!(memory.hits, 0);
    assert_eq!(memory.misses, 0);
    assert_eq!(memory.entries, 1);
}

#[tokio::test]
async fn freshness_remembers_the_last_live_success() {
    // Given: A live fetch at t=5s followed by a stale serve
    let clock = ManualClock::new(5_000);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");

    clock.advance(DAY * 31);
    source.fail();
    orchestrator.get_cables(&QueryParams::new()).await.expect("stale");

    // When: Freshness is inspected
    let freshness = orchestrator.freshness(DatasetKind::Cables).expect("tracked");

    // Then: The stale serve is reported without losing the live timestamp
    assert_eq!(freshness.last_source, ResultSource::StaleCache);
    assert_eq!(freshness.last_live_success_ms, Some(5_000));
    assert_eq!(freshness.last_confidence, 0.75);
}

#[tokio::test]
async fn when_orchestrator_is_destroyed_cached_data_remains_available() {
    // Given: Cached cables and a subscribed listener
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");
    assert!(orchestrator.subscribe_revalidations().is_some());

    // When: The orchestrator is destroyed and the source goes down
    orchestrator.destroy();
    source.fail();

    // Then: Tracking state is gone but the cache still answers
    assert!(orchestrator.freshness(DatasetKind::Cables).is_none());
    assert!(orchestrator.subscribe_revalidations().is_none());
    assert!(orchestrator.auto_refresh_kinds().is_empty());
    let cached = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("cached");
    assert_eq!(cached.metadata.source, ResultSource::Cache);
}

#[tokio::test]
async fn manual_refresh_invalidates_and_refetches() {
    // Given: Cables cached for the default query and a filtered one
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    let filtered = QueryParams::new().with("country", "PT");
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");
    orchestrator.get_cables(&filtered).await.expect("live");

    // When: A manual refresh is requested
    let refreshed = orchestrator.refresh(DatasetKind::Cables).await.expect("refresh");

    // Then: The cache is bypassed, the source is called again and the
    // filtered query is invalidated
    assert_eq!(refreshed.metadata.source, ResultSource::Live(ProviderId::TeleGeography));
    assert_eq!(refreshed.data[0].id, "live-3");
    assert_eq!(source.calls(), 3);

    let cache = orchestrator.cache().expect("cache enabled");
    let default_entry = cache
        .get(&cache_key(DatasetKind::Cables, &QueryParams::new()))
        .await
        .expect("refreshed entry cached");
    assert_eq!(default_entry.data[0].id, "live-3");
    assert!(cache
        .get(&cache_key(DatasetKind::Cables, &filtered))
        .await
        .is_none());
}

#[tokio::test]
async fn when_refresh_fails_retained_data_is_still_served_stale() {
    // Given: Cables cached from one live call, then the source goes down
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");
    source.fail();

    // When: A manual refresh is requested during the outage
    let refreshed = orchestrator.refresh(DatasetKind::Cables).await.expect("refresh");

    // Then: The retained entry is served stale instead of fallback data
    assert_eq!(refreshed.metadata.source, ResultSource::StaleCache);
    assert_eq!(refreshed.metadata.confidence, 0.75);
    assert_eq!(refreshed.data[0].id, "live-1");
    assert_eq!(source.calls(), 2);

    // And: The entry survives for later reads
    let cached = orchestrator
        .get_cables(&QueryParams::new())
        .await
        .expect("cached");
    assert_eq!(cached.metadata.source, ResultSource::Cache);
    assert_eq!(cached.data[0].id, "live-1");
}

#[tokio::test]
async fn when_cached_data_is_stale_revalidation_serves_it_and_announces_the_refresh() {
    // Given: Cables cached and then aged past their TTL
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    let mut events = orchestrator.subscribe_revalidations().expect("broadcast listener");
    let first = orchestrator
        .get_revalidating(DatasetKind::Cables, &QueryParams::new())
        .await
        .expect("inline fetch");
    assert_eq!(first.metadata.source, ResultSource::Live(ProviderId::TeleGeography));

    clock.advance(DAY * 31);

    // When: The revalidating read is repeated
    let served = orchestrator
        .get_revalidating(DatasetKind::Cables, &QueryParams::new())
        .await
        .expect("stale served");

    // Then: Old data comes back immediately and a refresh event follows
    assert_eq!(served.metadata.source, ResultSource::StaleCache);
    assert_eq!(served.metadata.confidence, 0.95);
    assert_eq!(served.data[0].id, "live-1");

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event before timeout")
        .expect("event");
    assert_eq!(event.dataset, "cables");
    assert_eq!(event.result.data[0].id, "live-2");
}

#[tokio::test]
async fn when_fresh_entry_is_read_with_revalidation_it_is_reported_as_a_cache_hit() {
    // Given: Cables fetched live and cached at the current instant
    let clock = ManualClock::new(0);
    let source = ScriptedSource::cables(&clock);
    let orchestrator = orchestrator_with(&clock, vec![source.clone()]);
    orchestrator.get_cables(&QueryParams::new()).await.expect("live");

    // When: The same dataset is read with revalidation without time passing
    let served = orchestrator
        .get_revalidating(DatasetKind::Cables, &QueryParams::new())
        .await
        .expect("cached");

    // Then: The cached copy is served and reported as such
    assert_eq!(source.calls(), 1);
    assert_eq!(served.metadata.source, ResultSource::Cache);
    assert_eq!(served.metadata.freshness, Freshness::Cached);
    let log = orchestrator.attempt_log(DatasetKind::Cables).expect("log");
    assert_eq!(log.served_by(), Some(AttemptSource::Cache));
    let stats = orchestrator.statistics();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.live_calls, 1);
}

#[tokio::test]
async fn health_reports_each_registered_provider_once() {
    // Given: Sources for two providers
    let clock = ManualClock::new(0);
    let orchestrator = orchestrator_with(
        &clock,
        vec![ScriptedSource::cables(&clock), ScriptedSource::attacks(&clock, 0.88)],
    );

    // When: Health is requested
    let health = orchestrator.health().await;

    // Then: One entry per provider
    let providers: Vec<ProviderId> = health.iter().map(|entry| entry.provider).collect();
    assert_eq!(providers, vec![ProviderId::TeleGeography, ProviderId::CloudflareRadar]);
}

// =============================================================================
// Real adapter wiring
// =============================================================================

#[tokio::test]
async fn when_telegeography_returns_geojson_records_flow_through_as_live() {
    // Given: The real cable adapter over a canned GeoJSON response
    let clock = ManualClock::new(0);
    let body = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"id": "dunant", "name": "Dunant", "capacity_tbps": 250,
                           "owners": "Google", "updated": "2024-01-01T00:00:00Z"},
            "geometry": {"type": "LineString", "coordinates": [[-76.0, 36.8], [-1.8, 46.5]]}
        }]
    }"#;
    let adapter = CableCatalogAdapter::with_policy(
        ProviderPolicy::telegeography_default().with_retry(RetryPolicy::no_retry()),
        Arc::new(StaticHttpClient {
            response: HttpResponse::ok_json(body),
        }),
        Arc::new(clock.clone()),
    );
    let orchestrator = orchestrator_with(&clock, vec![Arc::new(adapter)]);

    // When: Cables are requested
    let result = orchestrator.get_cables(&QueryParams::new()).await.expect("live");

    // Then: The parsed cable is served live at full confidence
    assert_eq!(result.metadata.source, ResultSource::Live(ProviderId::TeleGeography));
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.data[0].id, "dunant");
    assert_eq!(result.data[0].confidence, 0.95);
}

#[tokio::test]
async fn when_telegeography_returns_server_errors_fallback_is_used() {
    // Given: The real cable adapter over an upstream returning 503
    let clock = ManualClock::new(0);
    let adapter = CableCatalogAdapter::with_policy(
        ProviderPolicy::telegeography_default().with_retry(RetryPolicy::no_retry()),
        Arc::new(StaticHttpClient {
            response: HttpResponse::new(503, "unavailable"),
        }),
        Arc::new(clock.clone()),
    );
    let orchestrator = orchestrator_with(&clock, vec![Arc::new(adapter)]);

    // When: Cables are requested
    let result = orchestrator.get_cables(&QueryParams::new()).await.expect("fallback");

    // Then: The fallback answers
    assert_eq!(result.metadata.source, ResultSource::Fallback);
    assert_eq!(result.metadata.confidence, 0.5);
}

// =============================================================================
// Auto-refresh
// =============================================================================

#[tokio::test(start_paused = true)]
async fn auto_refresh_timers_fire_and_stop_when_cancelled_or_destroyed() {
    // Given: Auto-refresh every minute for cables and attack telemetry
    let clock = ManualClock::new(0);
    let cables = ScriptedSource::cables(&clock);
    let attacks = ScriptedSource::attacks(&clock, 0.9);
    let config = OrchestratorConfig {
        auto_refresh: true,
        refresh_interval: Duration::from_secs(60),
        ..OrchestratorConfig::in_memory()
    };
    let orchestrator = OrchestratorBuilder::new()
        .with_config(config)
        .with_clock(Arc::new(clock.clone()))
        .with_fallback(Arc::new(FallbackDataSource::catalog_only()))
        .with_adapter(cables.clone())
        .with_adapter(attacks.clone())
        .build()
        .expect("orchestrator should build");
    assert_eq!(
        orchestrator.auto_refresh_kinds(),
        vec![DatasetKind::Cables, DatasetKind::AttackTelemetry]
    );

    // When: One interval passes
    tokio::time::sleep(Duration::from_secs(61)).await;

    // Then: Both kinds were refreshed once
    assert_eq!(cables.calls(), 1);
    assert_eq!(attacks.calls(), 1);

    // When: The cable timer is cancelled and another interval passes
    assert!(orchestrator.cancel_auto_refresh(DatasetKind::Cables));
    assert!(!orchestrator.cancel_auto_refresh(DatasetKind::Cables));
    tokio::time::sleep(Duration::from_secs(60)).await;

    // Then: Only attack telemetry keeps refreshing
    assert_eq!(cables.calls(), 1);
    assert_eq!(attacks.calls(), 2);
    assert_eq!(orchestrator.auto_refresh_kinds(), vec![DatasetKind::AttackTelemetry]);

    // When: The orchestrator is destroyed
    orchestrator.destroy();
    tokio::time::sleep(Duration::from_secs(180)).await;

    // Then: No timer fires again
    assert_eq!(attacks.calls(), 2);
    assert!(orchestrator.auto_refresh_kinds().is_empty());
}
