use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::client::ApiClient;
use super::transform::{
    finish, id_field, missing, number_field, str_field, timestamp_field, ResponseTransformer,
    TransformContext, TransformerKind,
};
use crate::clock::Clock;
use crate::data_source::{AdapterHealth, DataSource, SourceError, SourceFuture};
use crate::http_client::{HttpAuth, HttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::{DataResult, DatasetKind, GeoPoint, ProviderId, QueryParams, Record};

/// Exchange points (`/ix`) and facilities (`/fac`) from the PeeringDB API.
#[derive(Clone)]
pub struct PeeringDbAdapter {
    client: ApiClient,
    clock: Arc<dyn Clock>,
}

impl PeeringDbAdapter {
    pub const BASE_CONFIDENCE: f64 = 0.90;

    /// Anonymous access unless `api_key` is set.
    pub fn new(http: Arc<dyn HttpClient>, api_key: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(ProviderPolicy::peeringdb_default(), http, api_key, clock)
    }

    pub fn with_policy(
        policy: ProviderPolicy,
        http: Arc<dyn HttpClient>,
        api_key: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = api_key
            .filter(|key| !key.trim().is_empty())
            .map_or(HttpAuth::None, |key| HttpAuth::Header {
                name: String::from("Authorization"),
                value: format!("Api-Key {}", key.trim()),
            });

        Self {
            client: ApiClient::new(policy, http, auth, Arc::clone(&clock)),
            clock,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

/// Upstream filters PeeringDB understands.
fn upstream_params(query: &QueryParams) -> QueryParams {
    let mut params = QueryParams::new();
    if let Some(country) = query.country() {
        params.insert("country", country);
    }
    if let Some(limit) = query.limit() {
        params.insert("limit", limit.to_string());
    }
    params
}

impl DataSource for PeeringDbAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::PeeringDb
    }

    fn datasets(&self) -> &'static [DatasetKind] {
        &[DatasetKind::ExchangePoints, DatasetKind::DataCenters]
    }

    fn fetch<'a>(
        &'a self,
        kind: DatasetKind,
        query: &'a QueryParams,
    ) -> SourceFuture<'a, DataResult> {
        Box::pin(async move {
            let transformer = TransformerKind::for_dataset(self.id(), kind)
                .ok_or_else(|| SourceError::unsupported_dataset(self.id(), kind))?;
            let path = match kind {
                DatasetKind::DataCenters => "/fac",
                _ => "/ix",
            };

            let raw = self.client.get_json(path, &upstream_params(query)).await?;
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

fn data_array<'a>(raw: &'a Value, ctx: &TransformContext<'_>) -> Result<&'a Vec<Value>, SourceError> {
    raw.get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| missing(ctx.provider, "the data array"))
}

/// Common fields of `ix` and `fac` objects.
fn parse_entry(entry: &Value, kind: DatasetKind) -> Option<Record> {
    let id = id_field(entry, "id")?;
    let name = str_field(entry, "name")?;
    let mut record = Record::new(format!("{}-{id}", prefix(kind)), name, kind);

    if let Some(country) = str_field(entry, "country") {
        record = record.with_country(country.to_ascii_uppercase());
    }
    if let Some(city) = str_field(entry, "city") {
        record = record.with_attribute("city", city);
    }
    if let Some(org) = str_field(entry, "org_name") {
        record = record.with_owners(vec![org.to_owned()]);
    }
    if let Some(networks) = number_field(entry, "net_count") {
        record = record.with_attribute("participants", networks as u64);
    }
    if let Some(updated) = timestamp_field(entry, "updated") {
        record = record.with_observed_at(updated);
    }
    if let (Some(lat), Some(lon)) = (number_field(entry, "latitude"), number_field(entry, "longitude")) {
        if let Ok(location) = GeoPoint::new(lat, lon) {
            record = record.with_location(location);
        }
    }
    Some(record)
}

const fn prefix(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::DataCenters => "pdb-fac",
        _ => "pdb-ix",
    }
}

/// PeeringDB `ix` list.
pub struct ExchangeTransformer;

impl ResponseTransformer for ExchangeTransformer {
    fn transform(&self, raw: &Value, ctx: &TransformContext<'_>) -> Result<DataResult, SourceError> {
        let records = data_array(raw, ctx)?
            .iter()
            .filter_map(|entry| {
                let record = parse_entry(entry, DatasetKind::ExchangePoints)?;
                Some(match str_field(entry, "name_long") {
                    Some(long_name) => record.with_attribute("long_name", long_name),
                    None => record,
                })
            })
            .collect();
        Ok(finish(records, ctx))
    }
}

/// PeeringDB `fac` list.
pub struct FacilityTransformer;

impl ResponseTransformer for FacilityTransformer {
    fn transform(&self, raw: &Value, ctx: &TransformContext<'_>) -> Result<DataResult, SourceError> {
        let records = data_array(raw, ctx)?
            .iter()
            .filter_map(|entry| parse_entry(entry, DatasetKind::DataCenters))
            .collect();
        Ok(finish(records, ctx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpFuture, HttpRequest, HttpResponse};

    struct RecordingHttpClient {
        body: String,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn new(body: Value) -> Self {
            Self {
                body: body.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = HttpResponse::ok_json(self.body.clone());
            Box::pin(async move { Ok(response) })
        }
    }

    fn facilities() -> Value {
        json!({"data": [
            {
                "id": 1, "name": "Equinix FR5", "org_name": "Equinix", "city": "Frankfurt",
                "country": "DE", "latitude": 50.1, "longitude": 8.63, "net_count": 310,
                "updated": "2024-04-30T12:00:00Z"
            },
            {"id": 2, "name": "Unlocated DC", "country": "nl", "latitude": null, "longitude": null},
            {"name": "No id"}
        ]})
    }

    #[tokio::test]
    async fn facilities_request_sends_api_key_and_filters() {
        let http = Arc::new(RecordingHttpClient::new(facilities()));
        let adapter = PeeringDbAdapter::new(
            http.clone(),
            Some(String::from("key-123")),
            Arc::new(ManualClock::new(10)),
        );
        let query = QueryParams::new().with("country", "de").with("zoom", "4");

        let result = adapter
            .fetch(DatasetKind::DataCenters, &query)
            .await
            .expect("fetch");

        assert_eq!(result.data.len(), 1);
        let record = &result.data[0];
        assert_eq!(record.id, "pdb-fac-1");
        assert_eq!(record.owners, vec![String::from("Equinix")]);
        assert!((record.confidence - 0.7875).abs() < 0.001);
        assert!(!record.estimated);

        let requests = http.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://www.peeringdb.com/api/fac?country=DE");
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Api-Key key-123")
        );
    }

    #[test]
    fn exchange_without_coordinates_is_located_by_country() {
        let raw = json!({"data": [{"id": 26, "name": "AMS-IX", "name_long": "Amsterdam Internet Exchange", "country": "NL", "net_count": "880"}]});
        let query = QueryParams::new();
        let ctx = TransformContext {
            provider: ProviderId::PeeringDb,
            kind: DatasetKind::ExchangePoints,
            base_confidence: PeeringDbAdapter::BASE_CONFIDENCE,
            now_ms: 0,
            query: &query,
        };

        let result = ExchangeTransformer.transform(&raw, &ctx).expect("transform");
        let record = &result.data[0];
        assert_eq!(record.id, "pdb-ix-26");
        assert_eq!(record.attributes["participants"], json!(880));
        assert_eq!(record.estimated_fields(), vec![String::from("location")]);
        assert_eq!(record.confidence, 0.45);
    }

    #[tokio::test]
    async fn rejects_cable_requests() {
        let http = Arc::new(RecordingHttpClient::new(facilities()));
        let adapter = PeeringDbAdapter::new(http.clone(), None, Arc::new(ManualClock::new(0)));

        let error = adapter
            .fetch(DatasetKind::Cables, &QueryParams::new())
            .await
            .expect_err("unsupported");
        assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
        assert!(http.recorded_requests().is_empty());
    }
}
