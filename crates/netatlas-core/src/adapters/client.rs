use std::sync::Arc;

use serde_json::Value;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::clock::Clock;
use crate::data_source::{AdapterHealth, HealthState, SourceError};
use crate::dedup::{request_key, RequestDeduplicator};
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::RateBudget;
use crate::{ProviderId, QueryParams};

struct ClientInner {
    policy: ProviderPolicy,
    http: Arc<dyn HttpClient>,
    auth: HttpAuth,
    breaker: CircuitBreaker,
    budget: RateBudget,
    dedup: RequestDeduplicator<HttpResponse, SourceError>,
}

/// Low-level upstream client shared by the source adapters.
///
/// A request passes, outermost first: deduplication by request key, the
/// circuit breaker, the retry policy, the rate budget, the per-provider
/// timeout, then the HTTP transport. Each adapter owns its own client, so
/// breaker state is never shared between providers.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        policy: ProviderPolicy,
        http: Arc<dyn HttpClient>,
        auth: HttpAuth,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaker =
            CircuitBreaker::with_clock(policy.provider_id.as_str(), policy.breaker, Arc::clone(&clock));
        let budget = RateBudget::from_policy(&policy, clock);
        Self {
            inner: Arc::new(ClientInner {
                policy,
                http,
                auth,
                breaker,
                budget,
                dedup: RequestDeduplicator::new(),
            }),
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.inner.policy.provider_id
    }

    pub fn policy(&self) -> &ProviderPolicy {
        &self.inner.policy
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// `GET` a JSON document from `path` under the provider base URL.
    pub async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value, SourceError> {
        let response = self.get(path, params).await?;
        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::invalid_response(format!(
                "{} returned malformed JSON: {error}",
                self.provider()
            ))
        })
    }

    pub async fn get(&self, path: &str, params: &QueryParams) -> Result<HttpResponse, SourceError> {
        let endpoint = self.inner.policy.endpoint(path);
        let key = request_key(HttpMethod::Get, &endpoint, params);
        let url = if params.is_empty() {
            endpoint
        } else {
            format!("{endpoint}?{}", params.serialize())
        };

        let inner = Arc::clone(&self.inner);
        self.inner
            .dedup
            .deduplicate(key, move || async move { inner.execute_protected(&url).await })
            .await
    }

    pub fn health(&self) -> AdapterHealth {
        let breaker = self.inner.breaker.snapshot();
        let rate_tokens_remaining = self.inner.budget.remaining();
        let state = match breaker.state {
            CircuitState::Open => HealthState::Unhealthy,
            CircuitState::HalfOpen => HealthState::Degraded,
            CircuitState::Closed if rate_tokens_remaining == 0 => HealthState::Degraded,
            CircuitState::Closed => HealthState::Healthy,
        };

        AdapterHealth {
            provider: self.provider(),
            state,
            breaker,
            rate_tokens_remaining,
            rate_window_resets_at_ms: self.inner.budget.resets_at_ms(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.dedup.pending_count()
    }
}

impl ClientInner {
    async fn execute_protected(&self, url: &str) -> Result<HttpResponse, SourceError> {
        self.breaker
            .call(|| self.policy.retry.execute(|| self.attempt(url)))
            .await
            .inspect_err(|error| {
                tracing::warn!(
                    provider = %self.policy.provider_id,
                    code = error.code(),
                    %error,
                    "upstream request failed"
                );
            })
    }

    async fn attempt(&self, url: &str) -> Result<HttpResponse, SourceError> {
        self.budget.try_acquire()?;

        let provider = self.policy.provider_id;
        let request = HttpRequest::get(url)
            .with_auth(&self.auth)
            .with_header("accept", "application/json")
            .with_timeout(self.policy.timeout);

        let response = tokio::time::timeout(self.policy.timeout, self.http.execute(request))
            .await
            .map_err(|_| {
                SourceError::timeout(format!(
                    "{provider} request timed out after {}ms",
                    self.policy.timeout.as_millis()
                ))
            })?
            .map_err(|error| {
                let classified = SourceError::from(error);
                SourceError::new(
                    classified.kind(),
                    format!("{provider} transport error: {}", classified.message()),
                )
            })?;

        if !response.is_success() {
            return Err(SourceError::from_status(
                response.status,
                format!("{provider} upstream returned status {}", response.status),
            ));
        }

        Ok(response)
    }
}
