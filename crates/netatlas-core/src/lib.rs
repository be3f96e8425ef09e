//! # Netatlas Core
//!
//! Resilient multi-source data orchestration for internet infrastructure
//! datasets: submarine cables, internet exchange points, data centers and
//! attack telemetry.
//!
//! ## Overview
//!
//! The crate fronts three live upstreams with a layered resilience stack:
//!
//! - **Per-provider adapters** for TeleGeography, PeeringDB and Cloudflare Radar
//! - **Circuit breaker, retry and rate budget** around every upstream call
//! - **Request deduplication** so concurrent identical calls share one fetch
//! - **Two-tier cache** (memory + DuckDB) with per-dataset invalidation rules
//! - **Fallback source** that always returns usable, clearly tagged data
//! - **Orchestrator** walking cache, live, stale cache and fallback in order
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters and response transformers |
//! | [`batcher`] | Time-window request batching |
//! | [`cache`] | Memory and persistent tiers, invalidation rules |
//! | [`circuit_breaker`] | Three-state breaker for upstream calls |
//! | [`clock`] | Injectable time source |
//! | [`config`] | Environment-driven orchestrator settings |
//! | [`data_source`] | Adapter trait, health and structured errors |
//! | [`dedup`] | In-flight request deduplication |
//! | [`domain`] | Dataset kinds, queries and records |
//! | [`error`] | Core error types |
//! | [`events`] | Background revalidation notifications |
//! | [`fallback`] | Catalog, synthetic and estimated data |
//! | [`http_client`] | HTTP client abstraction |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`orchestrator`] | Fallback chain, statistics, auto-refresh |
//! | [`provider_policy`] | Per-provider endpoints, retry and quotas |
//! | [`result`] | Result envelope with provenance metadata |
//! | [`retry`] | Exponential backoff retry |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Per-provider rate budgets |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use netatlas_core::{OrchestratorBuilder, OrchestratorConfig, QueryParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = OrchestratorBuilder::new()
//!         .with_config(OrchestratorConfig::from_env()?)
//!         .with_real_clients()
//!         .build()?;
//!
//!     let cables = orchestrator
//!         .get_cables(&QueryParams::new().with("country", "PT"))
//!         .await?;
//!     println!(
//!         "{} cables from {} (confidence {})",
//!         cables.metadata.count, cables.metadata.source, cables.metadata.confidence
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Orchestrator   │──────────────┐
//! └────────┬────────┘              │
//!          │                       ▼
//!          │              ┌──────────────────┐
//!          │              │ Tiered Cache     │
//!          │              │ (memory/duckdb)  │
//!          ▼              └──────────────────┘
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Source     │────▶│ Breaker / Retry  │
//! │ (Adapter Trait) │     │ Rate Budget      │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       ▼
//!          │              ┌──────────────────┐
//!          │              │ HTTP Client      │
//!          ▼              └──────────────────┘
//! ┌─────────────────┐
//! │ Fallback Source │
//! └─────────────────┘
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only (never logged)
//! - All HTTP requests use TLS via reqwest

pub mod adapters;
pub mod batcher;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod data_source;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod events;
pub mod fallback;
pub mod http_client;
pub mod logging;
pub mod orchestrator;
pub mod provider_policy;
pub mod result;
pub mod retry;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{ApiClient, CableCatalogAdapter, PeeringDbAdapter, RadarAdapter};

// Batching and deduplication
pub use batcher::RequestBatcher;
pub use dedup::RequestDeduplicator;

// Caching
pub use cache::{
    CacheStats, DuckDbTier, InvalidationRule, InvalidationStrategy, MemoryTier, RevalidateTrigger,
    TieredCache,
};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Time
pub use clock::{Clock, ManualClock, SystemClock};

// Configuration and logging
pub use config::OrchestratorConfig;
pub use logging::{init_logging, LogFormat};

// Data source trait and types
pub use data_source::{
    AdapterHealth, DataSource, HealthState, SourceError, SourceErrorKind, SourceFuture,
};

// Domain models
pub use domain::{DatasetKind, GeoPoint, QueryParams, Record, UtcDateTime};

// Error types
pub use error::{CoreError, ValidationError};

// Revalidation events
pub use events::{BroadcastListener, RevalidationEvent, RevalidationListener};

// Fallback
pub use fallback::{FallbackDataSource, FallbackSource, SyntheticCounts};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Orchestration
pub use orchestrator::{
    cache_key, AttemptSource, DataOrchestrator, FreshnessRecord, InfrastructureSnapshot,
    OrchestratorBuilder, OrchestratorError, SourceAttempt, SourceAttemptLog, Statistics,
};

// Provider policies
pub use provider_policy::ProviderPolicy;

// Result envelope
pub use result::{DataResult, Freshness, ResultMetadata, ResultSource};

// Retry logic
pub use retry::{RetryPolicy, Retryable};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::RateBudget;
