use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::{Arc, Mutex};

use netatlas_store::CacheStore;

use super::refresh::RefreshTimers;
use super::stats::Counters;
use super::DataOrchestrator;
use crate::adapters::{CableCatalogAdapter, PeeringDbAdapter, RadarAdapter};
use crate::cache::{DuckDbTier, InvalidationStrategy, MemoryTier, PersistentTier, TieredCache};
use crate::clock::{Clock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::data_source::DataSource;
use crate::dedup::RequestDeduplicator;
use crate::events::{BroadcastListener, RevalidationListener};
use crate::fallback::{FallbackDataSource, FallbackSource};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::CoreError;

/// Builder for a [`DataOrchestrator`].
///
/// Without [`OrchestratorBuilder::with_real_clients`] or explicit adapters,
/// no live source is registered and every request is served from cache or
/// the fallback source.
///
/// # Environment Variables
///
/// | Provider | Primary Env Var | Fallback Env Var |
/// |----------|----------------|------------------|
/// | PeeringDB | `NETATLAS_PEERINGDB_API_KEY` | `PEERINGDB_API_KEY` |
/// | Cloudflare Radar | `NETATLAS_RADAR_TOKEN` | `CLOUDFLARE_API_TOKEN` |
/// | TeleGeography | (no key required) | - |
///
/// Cache and refresh settings come from [`OrchestratorConfig::from_env`]
/// when passed via [`OrchestratorBuilder::with_config`].
///
/// # Example
///
/// ```rust,ignore
/// use netatlas_core::{OrchestratorBuilder, OrchestratorConfig};
///
/// let orchestrator = OrchestratorBuilder::new()
///     .with_config(OrchestratorConfig::from_env()?)
///     .with_real_clients()
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    use_real_clients: bool,
    peeringdb_api_key: Option<String>,
    radar_token: Option<String>,
    http: Option<Arc<dyn HttpClient>>,
    adapters: Vec<Arc<dyn DataSource>>,
    clock: Arc<dyn Clock>,
    cache: Option<TieredCache>,
    strategy: InvalidationStrategy,
    listener: Option<Arc<dyn RevalidationListener>>,
    fallback: Option<Arc<dyn FallbackSource>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            use_real_clients: false,
            peeringdb_api_key: None,
            radar_token: None,
            http: None,
            adapters: Vec::new(),
            clock: Arc::new(SystemClock),
            cache: None,
            strategy: InvalidationStrategy::default(),
            listener: None,
            fallback: None,
        }
    }

    /// Register the three built-in adapters, reading credentials from the
    /// environment. Providers without a key still attempt anonymous access.
    pub fn with_real_clients(mut self) -> Self {
        self.use_real_clients = true;
        self.peeringdb_api_key = env::var("NETATLAS_PEERINGDB_API_KEY")
            .or_else(|_| env::var("PEERINGDB_API_KEY"))
            .ok();
        self.radar_token = env::var("NETATLAS_RADAR_TOKEN")
            .or_else(|_| env::var("CLOUDFLARE_API_TOKEN"))
            .ok();
        self
    }

    pub fn with_peeringdb_key(mut self, key: impl Into<String>) -> Self {
        self.peeringdb_api_key = Some(key.into());
        self
    }

    pub fn with_radar_token(mut self, token: impl Into<String>) -> Self {
        self.radar_token = Some(token.into());
        self
    }

    /// Transport used by the built-in adapters.
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Register an adapter for every dataset it supports. Later
    /// registrations win over earlier ones and over the built-in adapters.
    pub fn with_adapter(mut self, adapter: Arc<dyn DataSource>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a prebuilt cache instead of one derived from the config.
    pub fn with_cache(mut self, cache: TieredCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Invalidation rules for a cache derived from the config.
    pub fn with_strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Observer of background revalidations. Replaces the default
    /// broadcast listener.
    pub fn with_listener(mut self, listener: Arc<dyn RevalidationListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Assemble the orchestrator, opening the persistent cache when
    /// enabled and starting auto-refresh timers when configured.
    pub fn build(self) -> Result<Arc<DataOrchestrator>, CoreError> {
        let cache = self.build_cache()?;

        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();
        if self.use_real_clients {
            let http = self
                .http
                .clone()
                .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
            sources.push(Arc::new(CableCatalogAdapter::new(
                Arc::clone(&http),
                Arc::clone(&self.clock),
            )));
            sources.push(Arc::new(PeeringDbAdapter::new(
                Arc::clone(&http),
                self.peeringdb_api_key.clone(),
                Arc::clone(&self.clock),
            )));
            sources.push(Arc::new(RadarAdapter::new(
                http,
                self.radar_token.clone(),
                Arc::clone(&self.clock),
            )));
        }
        sources.extend(self.adapters);

        let mut adapters: HashMap<_, Arc<dyn DataSource>> = HashMap::new();
        for source in sources {
            for kind in source.datasets() {
                adapters.insert(*kind, Arc::clone(&source));
            }
        }

        let (listener, broadcast) = match self.listener {
            Some(listener) => (listener, None),
            None => {
                let broadcast = BroadcastListener::default();
                let listener: Arc<dyn RevalidationListener> = Arc::new(broadcast.clone());
                (listener, Some(broadcast))
            }
        };

        let registered: BTreeMap<_, _> = adapters
            .iter()
            .map(|(kind, adapter)| (*kind, adapter.id()))
            .collect();
        tracing::info!(
            adapters = ?registered,
            cache = cache.is_some(),
            persistent = cache.as_ref().is_some_and(TieredCache::has_persistent_tier),
            "orchestrator built"
        );

        let orchestrator = Arc::new(DataOrchestrator {
            adapters,
            cache,
            fallback: self
                .fallback
                .unwrap_or_else(|| Arc::new(FallbackDataSource::default())),
            clock: self.clock,
            config: self.config,
            live_dedup: Arc::new(RequestDeduplicator::new()),
            counters: Arc::new(Counters::default()),
            attempt_logs: Mutex::new(HashMap::new()),
            freshness: Mutex::new(HashMap::new()),
            listener: Mutex::new(Some(listener)),
            broadcast: Mutex::new(broadcast),
            timers: RefreshTimers::default(),
        });

        if orchestrator.config.auto_refresh {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(CoreError::Config(String::from(
                    "auto-refresh requires a running tokio runtime",
                )));
            }
            for kind in orchestrator.adapters.keys().copied().collect::<Vec<_>>() {
                orchestrator.start_auto_refresh(kind);
            }
        }

        Ok(orchestrator)
    }

    fn build_cache(&self) -> Result<Option<TieredCache>, CoreError> {
        if !self.config.cache_enabled {
            return Ok(None);
        }
        if let Some(cache) = &self.cache {
            return Ok(Some(cache.clone()));
        }

        let memory = MemoryTier::new(self.config.memory_budget_bytes, Arc::clone(&self.clock));
        let persistent: Option<Arc<dyn PersistentTier>> = if self.config.persistent_cache {
            let store = CacheStore::open(self.config.store.clone())?;
            Some(Arc::new(DuckDbTier::new(store, Arc::clone(&self.clock))))
        } else {
            None
        };

        Ok(Some(TieredCache::with_retention(
            memory,
            persistent,
            self.strategy.clone(),
            Arc::clone(&self.clock),
            self.config.stale_retention,
        )))
    }
}
