//! Terminal, always-available data source.
//!
//! [`FallbackDataSource`] serves a fixed catalog of well-known
//! infrastructure padded with seeded synthetic records, so totals resemble
//! production scale without any network access. Every record it returns is
//! stamped `confidence = 0.5`, `freshness = static`, `estimated = true`.

mod catalog;
pub mod estimate;
mod synthetic;

use std::sync::OnceLock;

use serde_json::Value;

pub use synthetic::{synthetic_records, SyntheticCounts};

use crate::data_source::SourceError;
use crate::{DataResult, DatasetKind, Freshness, QueryParams, Record, ResultSource};

pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Last rung of the orchestrator's fallback chain.
///
/// Implementations are expected never to fail; an error here is treated as
/// fatal by the orchestrator.
pub trait FallbackSource: Send + Sync {
    fn generate(
        &self,
        kind: DatasetKind,
        query: &QueryParams,
        now_ms: i64,
    ) -> Result<DataResult, SourceError>;
}

/// Catalog plus synthetic records, generated once per kind and reused.
pub struct FallbackDataSource {
    counts: SyntheticCounts,
    generated: [OnceLock<Vec<Record>>; 4],
}

impl Default for FallbackDataSource {
    fn default() -> Self {
        Self::new(SyntheticCounts::default())
    }
}

impl FallbackDataSource {
    pub fn new(counts: SyntheticCounts) -> Self {
        Self {
            counts,
            generated: Default::default(),
        }
    }

    /// Only the well-known catalog, no synthetic padding.
    pub fn catalog_only() -> Self {
        Self::new(SyntheticCounts::none())
    }

    pub fn counts(&self) -> SyntheticCounts {
        self.counts
    }

    /// Every record of `kind`, unfiltered.
    pub fn records(&self, kind: DatasetKind) -> &[Record] {
        self.generated[slot(kind)].get_or_init(|| {
            let mut records = catalog::records(kind);
            records.extend(synthetic_records(
                kind,
                self.counts.for_kind(kind),
                synthetic::seed_for(kind),
            ));
            records
                .into_iter()
                .map(|record| record.stamped(FALLBACK_CONFIDENCE, Freshness::Static, true))
                .collect()
        })
    }
}

impl FallbackSource for FallbackDataSource {
    fn generate(
        &self,
        kind: DatasetKind,
        query: &QueryParams,
        now_ms: i64,
    ) -> Result<DataResult, SourceError> {
        let country = query.country();
        let limit = query.limit().unwrap_or(usize::MAX);
        let data: Vec<Record> = self
            .records(kind)
            .iter()
            .filter(|record| {
                country
                    .as_deref()
                    .map_or(true, |country| matches_country(record, country))
            })
            .take(limit)
            .cloned()
            .collect();

        tracing::debug!(dataset = %kind, count = data.len(), "generated fallback dataset");
        Ok(DataResult::new(
            data,
            ResultSource::Fallback,
            FALLBACK_CONFIDENCE,
            Freshness::Static,
            now_ms,
        ))
    }
}

/// Country filter: the record's own country, or any cable landing country.
pub(crate) fn matches_country(record: &Record, country: &str) -> bool {
    if record
        .country
        .as_deref()
        .is_some_and(|own| own.eq_ignore_ascii_case(country))
    {
        return true;
    }

    record
        .attributes
        .get("landing_countries")
        .and_then(Value::as_array)
        .is_some_and(|countries| {
            countries
                .iter()
                .filter_map(Value::as_str)
                .any(|landing| landing.eq_ignore_ascii_case(country))
        })
}

const fn slot(kind: DatasetKind) -> usize {
    match kind {
        DatasetKind::Cables => 0,
        DatasetKind::ExchangePoints => 1,
        DatasetKind::DataCenters => 2,
        DatasetKind::AttackTelemetry => 3,
    }
}
