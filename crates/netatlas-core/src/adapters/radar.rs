use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::client::ApiClient;
use super::transform::{
    finish, missing, number_field, str_field, timestamp_field, ResponseTransformer,
    TransformContext, TransformerKind,
};
use crate::clock::Clock;
use crate::data_source::{AdapterHealth, DataSource, SourceError, SourceFuture};
use crate::fallback::estimate::country_centroid;
use crate::http_client::{HttpAuth, HttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::{DataResult, DatasetKind, ProviderId, QueryParams, Record};

const TOP_ATTACKS_PATH: &str = "/attacks/layer7/top/attacks";
const DEFAULT_LIMIT: usize = 50;

/// Layer-7 attack origin/target pairs from Cloudflare Radar.
#[derive(Clone)]
pub struct RadarAdapter {
    client: ApiClient,
    clock: Arc<dyn Clock>,
}

impl RadarAdapter {
    pub const BASE_CONFIDENCE: f64 = 0.88;

    pub fn new(http: Arc<dyn HttpClient>, token: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(ProviderPolicy::radar_default(), http, token, clock)
    }

    pub fn with_policy(
        policy: ProviderPolicy,
        http: Arc<dyn HttpClient>,
        token: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = token
            .filter(|token| !token.trim().is_empty())
            .map_or(HttpAuth::None, |token| HttpAuth::BearerToken(token.trim().to_owned()));

        Self {
            client: ApiClient::new(policy, http, auth, Arc::clone(&clock)),
            clock,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

fn upstream_params(query: &QueryParams) -> QueryParams {
    let mut params = QueryParams::new()
        .with("format", "json")
        .with("dateRange", query.get("range").unwrap_or("1d"))
        .with("limit", query.limit().unwrap_or(DEFAULT_LIMIT).to_string());
    if let Some(country) = query.country() {
        params.insert("location", country);
    }
    params
}

impl DataSource for RadarAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::CloudflareRadar
    }

    fn datasets(&self) -> &'static [DatasetKind] {
        &[DatasetKind::AttackTelemetry]
    }

    fn fetch<'a>(
        &'a self,
        kind: DatasetKind,
        query: &'a QueryParams,
    ) -> SourceFuture<'a, DataResult> {
        Box::pin(async move {
            let transformer = TransformerKind::for_dataset(self.id(), kind)
                .ok_or_else(|| SourceError::unsupported_dataset(self.id(), kind))?;

            let raw = self
                .client
                .get_json(TOP_ATTACKS_PATH, &upstream_params(query))
                .await?;
            let ctx = TransformContext {
                provider: self.id(),
                kind,
                base_confidence: Self::BASE_CONFIDENCE,
                now_ms: self.clock.now_ms(),
                query,
            };
            transformer.transform(&raw, &ctx)
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = AdapterHealth> + Send + 'a>> {
        Box::pin(async move { self.client.health() })
    }
}

/// Radar `top/attacks` envelope: `result.top_0` pairs plus `result.meta`.
pub struct RadarAttackTransformer;

impl ResponseTransformer for RadarAttackTransformer {
    fn transform(&self, raw: &Value, ctx: &TransformContext<'_>) -> Result<DataResult, SourceError> {
        if raw.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = raw
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.first())
                .and_then(|error| str_field(error, "message"))
                .unwrap_or("unspecified error");
            return Err(SourceError::invalid_response(format!(
                "{} reported failure: {reason}",
                ctx.provider
            )));
        }

        let result = raw
            .get("result")
            .ok_or_else(|| missing(ctx.provider, "the result object"))?;
        let pairs = result
            .get("top_0")
            .and_then(Value::as_array)
            .ok_or_else(|| missing(ctx.provider, "result.top_0"))?;
        let observed_at = result
            .get("meta")
            .and_then(|meta| timestamp_field(meta, "lastUpdated"));

        let records = pairs
            .iter()
            .filter_map(|pair| {
                let origin = str_field(pair, "originCountryAlpha2")?.to_ascii_uppercase();
                let target = str_field(pair, "targetCountryAlpha2")?.to_ascii_uppercase();
                let share = number_field(pair, "value").unwrap_or(0.0);
                let name = match (
                    str_field(pair, "originCountryName"),
                    str_field(pair, "targetCountryName"),
                ) {
                    (Some(origin_name), Some(target_name)) => format!("{origin_name} to {target_name}"),
                    _ => format!("{origin} to {target}"),
                };

                let mut record = Record::new(
                    format!("radar-{}-{}", origin.to_ascii_lowercase(), target.to_ascii_lowercase()),
                    name,
                    DatasetKind::AttackTelemetry,
                )
                .with_country(target.as_str())
                .with_attribute("origin_country", origin.as_str())
                .with_attribute("target_country", target.as_str())
                .with_attribute("share_percent", share);

                if let (Some(from), Some(to)) = (country_centroid(&origin), country_centroid(&target)) {
                    record = record.with_path(if from == to { vec![from] } else { vec![from, to] });
                }
                if let Some(observed_at) = observed_at {
                    record = record.with_observed_at(observed_at);
                }
                Some(record)
            })
            .collect();

        Ok(finish(records, ctx))
    }
}
