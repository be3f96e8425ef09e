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

const CABLE_GEO_PATH: &str = "/cable/cable-geo.json";

/// Submarine cable catalog backed by the TeleGeography cable map GeoJSON.
///
/// The catalog is a single static file, so query filters are applied
/// locally after download.
#[derive(Clone)]
pub struct CableCatalogAdapter {
    client: ApiClient,
    clock: Arc<dyn Clock>,
}

impl CableCatalogAdapter {
    pub const BASE_CONFIDENCE: f64 = 0.95;

    pub fn new(http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(ProviderPolicy::telegeography_default(), http, clock)
    }

    pub fn with_policy(
        policy: ProviderPolicy,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client: ApiClient::new(policy, http, HttpAuth::None, Arc::clone(&clock)),
            clock,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

impl DataSource for CableCatalogAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::TeleGeography
    }

    fn datasets(&self) -> &'static [DatasetKind] {
        &[DatasetKind::Cables]
    }

    fn fetch<'a>(
        &'a self,
        kind: DatasetKind,
        query: &'a QueryParams,
    ) -> SourceFuture<'a, DataResult> {
        Box::pin(async move {
            let transformer = TransformerKind::for_dataset(self.id(), kind)
                .ok_or_else(|| SourceError::unsupported_dataset(self.id(), kind))?;

            let raw = self.client.get_json(CABLE_GEO_PATH, &QueryParams::new()).await?;
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

/// GeoJSON `FeatureCollection` of `MultiLineString` cable routes.
pub struct CableGeoTransformer;

impl ResponseTransformer for CableGeoTransformer {
    fn transform(&self, raw: &Value, ctx: &TransformContext<'_>) -> Result<DataResult, SourceError> {
        let features = raw
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| missing(ctx.provider, "the features array"))?;

        let records = features.iter().filter_map(parse_cable).collect();
        Ok(finish(records, ctx))
    }
}

fn parse_cable(feature: &Value) -> Option<Record> {
    let properties = feature.get("properties")?;
    let name = str_field(properties, "name")?;
    let id = id_field(properties, "id").unwrap_or_else(|| slug(name));

    let mut record = Record::new(id, name, DatasetKind::Cables)
        .with_path(route(feature.get("geometry")));

    if let Some(capacity) = number_field(properties, "capacity_tbps").filter(|value| *value > 0.0) {
        record = record.with_capacity_tbps(capacity);
    }

    let owners = owners(properties.get("owners"));
    if !owners.is_empty() {
        record = record.with_owners(owners);
    }

    if let Some(updated) = timestamp_field(properties, "updated") {
        record = record.with_observed_at(updated);
    }

    if let Some(rfs) = str_field(properties, "rfs") {
        record = record.with_attribute("ready_for_service", rfs);
    }

    if let Some(countries) = properties.get("landing_countries").and_then(Value::as_array) {
        let countries: Vec<String> = countries
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_ascii_uppercase)
            .collect();
        if !countries.is_empty() {
            record = record.with_attribute("landing_countries", countries);
        }
    }

    Some(record)
}

/// Flatten `LineString`/`MultiLineString` coordinates (`[lon, lat]` pairs),
/// skipping invalid points.
fn route(geometry: Option<&Value>) -> Vec<GeoPoint> {
    let Some(geometry) = geometry else {
        return Vec::new();
    };
    let Some(coordinates) = geometry.get("coordinates").and_then(Value::as_array) else {
        return Vec::new();
    };

    let lines: Vec<&Vec<Value>> = match str_field(geometry, "type") {
        Some("LineString") => vec![coordinates],
        _ => coordinates.iter().filter_map(Value::as_array).collect(),
    };

    lines
        .into_iter()
        .flatten()
        .filter_map(|pair| {
            let pair = pair.as_array()?;
            let lon = pair.first()?.as_f64()?;
            let lat = pair.get(1)?.as_f64()?;
            GeoPoint::new(lat, lon).ok()
        })
        .collect()
}

fn owners(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(str::to_owned)
            .collect(),
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Freshness;

    fn ctx(query: &QueryParams) -> TransformContext<'_> {
        TransformContext {
            provider: ProviderId::TeleGeography,
            kind: DatasetKind::Cables,
            base_confidence: CableCatalogAdapter::BASE_CONFIDENCE,
            now_ms: 1_000,
            query,
        }
    }

    fn payload() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {
                        "id": "marea",
                        "name": "MAREA",
                        "owners": "Microsoft, Meta, Telxius",
                        "capacity_tbps": 200,
                        "updated": "2024-05-01T00:00:00Z",
                        "landing_countries": ["us", "es"]
                    },
                    "geometry": {
                        "type": "MultiLineString",
                        "coordinates": [[[-75.98, 36.85], [-40.0, 40.0]], [[-40.0, 40.0], [-2.93, 43.26]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"name": "Baltic Link 2"},
                    "geometry": {"type": "LineString", "coordinates": [[18.0, 59.3], [24.9, 60.2], [999.0, 0.0]]}
                },
                {"type": "Feature", "properties": {}}
            ]
        })
    }

    #[test]
    fn parses_geojson_features() {
        let query = QueryParams::new();
        let result = CableGeoTransformer
            .transform(&payload(), &ctx(&query))
            .expect("transform");

        assert_eq!(result.metadata.count, 2);
        assert_eq!(result.metadata.confidence, 0.95);
        assert_eq!(result.metadata.freshness, Freshness::Live);

        let marea = &result.data[0];
        assert_eq!(marea.path.len(), 4);
        assert_eq!(marea.path[0].lat, 36.85);
        assert_eq!(marea.owners.len(), 3);
        assert_eq!(marea.confidence, 0.95);
        assert!(!marea.estimated);

        let baltic = &result.data[1];
        assert_eq!(baltic.id, "baltic-link-2");
        assert_eq!(baltic.path.len(), 2);
        assert_eq!(baltic.estimated_fields(), vec![String::from("capacity_tbps")]);
        assert!(baltic.estimated);
        assert_eq!(baltic.confidence, 0.594);
    }

    #[test]
    fn filters_by_landing_country() {
        let query = QueryParams::new().with("country", "ES");
        let result = CableGeoTransformer
            .transform(&payload(), &ctx(&query))
            .expect("transform");
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].id, "marea");
    }

    #[test]
    fn rejects_payload_without_features() {
        let query = QueryParams::new();
        let error = CableGeoTransformer
            .transform(&json!({"type": "Feature"}), &ctx(&query))
            .expect_err("invalid");
        assert_eq!(error.code(), "source.invalid_response");
    }
}
