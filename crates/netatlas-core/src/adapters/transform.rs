use serde_json::Value;

use super::peeringdb::{ExchangeTransformer, FacilityTransformer};
use super::radar::RadarAttackTransformer;
use super::telegeography::CableGeoTransformer;
use crate::data_source::SourceError;
use crate::fallback::estimate::backfill_record;
use crate::fallback::matches_country;
use crate::{DataResult, DatasetKind, Freshness, ProviderId, QueryParams, Record, UtcDateTime};

/// Inputs a transformer needs besides the raw payload.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub provider: ProviderId,
    pub kind: DatasetKind,
    pub base_confidence: f64,
    pub now_ms: i64,
    pub query: &'a QueryParams,
}

/// Converts one provider payload shape into canonical records.
pub trait ResponseTransformer: Send + Sync {
    fn transform(&self, raw: &Value, ctx: &TransformContext<'_>) -> Result<DataResult, SourceError>;
}

/// Typed selector over the provider payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformerKind {
    CableGeo,
    PeeringDbExchange,
    PeeringDbFacility,
    RadarAttacks,
}

impl TransformerKind {
    pub const fn for_dataset(provider: ProviderId, kind: DatasetKind) -> Option<Self> {
        match (provider, kind) {
            (ProviderId::TeleGeography, DatasetKind::Cables) => Some(Self::CableGeo),
            (ProviderId::PeeringDb, DatasetKind::ExchangePoints) => Some(Self::PeeringDbExchange),
            (ProviderId::PeeringDb, DatasetKind::DataCenters) => Some(Self::PeeringDbFacility),
            (ProviderId::CloudflareRadar, DatasetKind::AttackTelemetry) => Some(Self::RadarAttacks),
            _ => None,
        }
    }

    pub fn transformer(self) -> &'static dyn ResponseTransformer {
        match self {
            Self::CableGeo => &CableGeoTransformer,
            Self::PeeringDbExchange => &ExchangeTransformer,
            Self::PeeringDbFacility => &FacilityTransformer,
            Self::RadarAttacks => &RadarAttackTransformer,
        }
    }

    pub fn transform(self, raw: &Value, ctx: &TransformContext<'_>) -> Result<DataResult, SourceError> {
        self.transformer().transform(raw, ctx)
    }
}

/// Score, backfill, filter and wrap parsed records.
///
/// Quality is scored on the observed fields before backfilling, so an
/// estimated value never raises a record's confidence.
pub(crate) fn finish(records: Vec<Record>, ctx: &TransformContext<'_>) -> DataResult {
    let country = ctx.query.country();
    let limit = ctx.query.limit().unwrap_or(usize::MAX);

    let data = records
        .into_iter()
        .filter(|record| {
            country
                .as_deref()
                .map_or(true, |country| matches_country(record, country))
        })
        .take(limit)
        .map(|record| {
            let score = record.quality_score(ctx.base_confidence);
            let record = backfill_record(record);
            let estimated = !record.estimated_fields().is_empty();
            record.stamped(score, Freshness::Live, estimated)
        })
        .collect();

    DataResult::live(data, ctx.provider, ctx.base_confidence, ctx.now_ms)
}

pub(crate) fn str_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Numbers that may arrive as JSON numbers or numeric strings.
pub(crate) fn number_field(value: &Value, name: &str) -> Option<f64> {
    let parsed: Option<f64> = match value.get(name)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

/// Identifier that may arrive as a number or a string.
pub(crate) fn id_field(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        _ => None,
    }
}

pub(crate) fn timestamp_field(value: &Value, name: &str) -> Option<UtcDateTime> {
    str_field(value, name).and_then(UtcDateTime::parse_any_offset)
}

pub(crate) fn missing(provider: ProviderId, what: &str) -> SourceError {
    SourceError::invalid_response(format!("{provider} response is missing {what}"))
}
