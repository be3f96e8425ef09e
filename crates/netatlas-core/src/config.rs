use std::env;
use std::time::Duration;

use netatlas_store::StoreConfig;

use crate::cache::DEFAULT_MEMORY_BUDGET_BYTES;
use crate::CoreError;

/// Orchestrator-wide settings.
///
/// | Variable | Field | Default |
/// |----------|-------|---------|
/// | `NETATLAS_HOME` | `store` | `$HOME/.netatlas` |
/// | `NETATLAS_CACHE_ENABLED` | `cache_enabled` | `true` |
/// | `NETATLAS_PERSISTENT_CACHE` | `persistent_cache` | `true` |
/// | `NETATLAS_MEMORY_CACHE_MB` | `memory_budget_bytes` | 50 MB |
/// | `NETATLAS_AUTO_REFRESH` | `auto_refresh` | `false` |
/// | `NETATLAS_REFRESH_INTERVAL_SECS` | `refresh_interval` | 300 s |
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub cache_enabled: bool,
    pub persistent_cache: bool,
    pub store: StoreConfig,
    pub memory_budget_bytes: usize,
    /// How long live data is kept past its rule TTL for the stale rung.
    pub stale_retention: Duration,
    pub fallback_cache_ttl: Duration,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            persistent_cache: true,
            store: StoreConfig::default(),
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            stale_retention: Duration::from_secs(7 * 24 * 60 * 60),
            fallback_cache_ttl: Duration::from_secs(60 * 60),
            auto_refresh: false,
            refresh_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by `NETATLAS_*` variables.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Memory-only configuration without background timers.
    pub fn in_memory() -> Self {
        Self {
            persistent_cache: false,
            ..Self::default()
        }
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(home) = lookup("NETATLAS_HOME").filter(|value| !value.trim().is_empty()) {
            config.store = StoreConfig::in_dir(home.trim());
        }
        if let Some(value) = lookup("NETATLAS_CACHE_ENABLED") {
            config.cache_enabled = parse_flag("NETATLAS_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = lookup("NETATLAS_PERSISTENT_CACHE") {
            config.persistent_cache = parse_flag("NETATLAS_PERSISTENT_CACHE", &value)?;
        }
        if let Some(value) = lookup("NETATLAS_MEMORY_CACHE_MB") {
            let megabytes: usize = parse_number("NETATLAS_MEMORY_CACHE_MB", &value)?;
            config.memory_budget_bytes = megabytes.saturating_mul(1024 * 1024);
        }
        if let Some(value) = lookup("NETATLAS_AUTO_REFRESH") {
            config.auto_refresh = parse_flag("NETATLAS_AUTO_REFRESH", &value)?;
        }
        if let Some(value) = lookup("NETATLAS_REFRESH_INTERVAL_SECS") {
            let seconds: u64 = parse_number("NETATLAS_REFRESH_INTERVAL_SECS", &value)?;
            if seconds == 0 {
                return Err(CoreError::Config(String::from(
                    "NETATLAS_REFRESH_INTERVAL_SECS must be greater than zero",
                )));
            }
            config.refresh_interval = Duration::from_secs(seconds);
        }

        Ok(config)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoreError::Config(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, CoreError> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{name} must be a non-negative integer, got '{value}'")))
}
