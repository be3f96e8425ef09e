//! Result envelope returned by every data layer.

use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ProviderId, Record};

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultSource {
    Live(ProviderId),
    Cache,
    StaleCache,
    Fallback,
}

impl ResultSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live(provider) => provider.as_str(),
            Self::Cache => "cache",
            Self::StaleCache => "stale-cache",
            Self::Fallback => "fallback",
        }
    }

    pub const fn is_live(self) -> bool {
        matches!(self, Self::Live(_))
    }
}

impl Display for ResultSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResultSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "cache" => Ok(Self::Cache),
            "stale-cache" => Ok(Self::StaleCache),
            "fallback" => Ok(Self::Fallback),
            other => other
                .parse::<ProviderId>()
                .map(Self::Live)
                .map_err(D::Error::custom),
        }
    }
}

/// Categorical staleness indicator. Ordered for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Live,
    Cached,
    Stale,
    Static,
    Estimated,
    None,
}

impl Freshness {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cached => "cached",
            Self::Stale => "stale",
            Self::Static => "static",
            Self::Estimated => "estimated",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub source: ResultSource,
    pub confidence: f64,
    pub freshness: Freshness,
    pub timestamp_ms: i64,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_since_ms: Option<i64>,
}

/// Records plus the metadata describing their provenance.
///
/// Results are never mutated after construction; the `as_*` methods build
/// re-tagged copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResult {
    pub data: Vec<Record>,
    pub metadata: ResultMetadata,
}

impl DataResult {
    pub fn new(
        data: Vec<Record>,
        source: ResultSource,
        confidence: f64,
        freshness: Freshness,
        timestamp_ms: i64,
    ) -> Self {
        let count = data.len();
        Self {
            data,
            metadata: ResultMetadata {
                source,
                confidence: round_confidence(confidence),
                freshness,
                timestamp_ms,
                count,
                fallback_reason: None,
                stale_since_ms: None,
            },
        }
    }

    pub fn live(data: Vec<Record>, provider: ProviderId, confidence: f64, now_ms: i64) -> Self {
        Self::new(
            data,
            ResultSource::Live(provider),
            confidence,
            Freshness::Live,
            now_ms,
        )
    }

    /// Zero-confidence placeholder used when a dataset could not be produced.
    pub fn empty(now_ms: i64) -> Self {
        Self::new(Vec::new(), ResultSource::Fallback, 0.0, Freshness::None, now_ms)
    }

    pub fn with_fallback_reason(mut self, reason: impl Into<String>) -> Self {
        self.metadata.fallback_reason = Some(reason.into());
        self
    }

    /// Copy tagged as a fresh cache hit.
    pub fn as_cached(&self) -> Self {
        let mut result = self.clone();
        result.metadata.source = ResultSource::Cache;
        result.metadata.freshness = Freshness::Cached;
        result
    }

    /// Copy tagged as degraded stale data: confidence drops by `penalty`,
    /// floored at `floor`, and `stale_since_ms` records the original timestamp.
    pub fn as_stale(&self, penalty: f64, floor: f64) -> Self {
        let mut result = self.clone();
        let reduced = (self.metadata.confidence - penalty).max(floor);
        result.metadata.source = ResultSource::StaleCache;
        result.metadata.freshness = Freshness::Stale;
        result.metadata.confidence = round_confidence(reduced);
        result.metadata.stale_since_ms = Some(
            self.metadata
                .stale_since_ms
                .unwrap_or(self.metadata.timestamp_ms),
        );
        result
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.metadata.timestamp_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Confidence values are kept to three decimals so repeated penalties do not
/// accumulate floating point noise.
pub(crate) fn round_confidence(value: f64) -> f64 {
    (value.clamp(0.0, 1.0) * 1_000.0).round() / 1_000.0
}
