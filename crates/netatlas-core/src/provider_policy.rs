use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryPolicy;
use crate::ProviderId;

/// Per-provider transport limits and resilience settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub provider_id: ProviderId,
    pub base_url: String,
    /// Deadline for a single upstream call.
    pub timeout: Duration,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

impl ProviderPolicy {
    pub fn telegeography_default() -> Self {
        Self {
            provider_id: ProviderId::TeleGeography,
            base_url: String::from("https://www.submarinecablemap.com/api/v3"),
            timeout: Duration::from_secs(15),
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn peeringdb_default() -> Self {
        Self {
            provider_id: ProviderId::PeeringDb,
            base_url: String::from("https://www.peeringdb.com/api"),
            timeout: Duration::from_secs(10),
            // Anonymous PeeringDB access allows roughly 20 requests per minute.
            quota_window: Duration::from_secs(60),
            quota_limit: 20,
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn radar_default() -> Self {
        Self {
            provider_id: ProviderId::CloudflareRadar,
            base_url: String::from("https://api.cloudflare.com/client/v4/radar"),
            timeout: Duration::from_secs(10),
            quota_window: Duration::from_secs(300),
            quota_limit: 1_200,
            breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                ..CircuitBreakerConfig::default()
            },
            retry: RetryPolicy::default(),
        }
    }

    pub fn default_for(provider_id: ProviderId) -> Self {
        match provider_id {
            ProviderId::TeleGeography => Self::telegeography_default(),
            ProviderId::PeeringDb => Self::peeringdb_default(),
            ProviderId::CloudflareRadar => Self::radar_default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_quota(mut self, quota_window: Duration, quota_limit: u32) -> Self {
        self.quota_window = quota_window;
        self.quota_limit = quota_limit;
        self
    }

    /// `base_url` joined with `path`, with exactly one `/` between them.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
