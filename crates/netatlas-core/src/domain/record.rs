use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DatasetKind, Freshness, UtcDateTime, ValidationError};

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::OutOfRange {
                field: "lat",
                min: -90.0,
                max: 90.0,
            });
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::OutOfRange {
                field: "lon",
                min: -180.0,
                max: 180.0,
            });
        }
        Ok(Self { lat, lon })
    }
}

/// Canonical infrastructure record shared by every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub kind: DatasetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Route points for cables and origin/target arcs for attacks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_tbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<UtcDateTime>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    pub confidence: f64,
    pub freshness: Freshness,
    #[serde(default)]
    pub estimated: bool,
}

impl Record {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DatasetKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            location: None,
            path: Vec::new(),
            capacity_tbps: None,
            owners: Vec::new(),
            country: None,
            observed_at: None,
            attributes: BTreeMap::new(),
            confidence: 0.0,
            freshness: Freshness::None,
            estimated: false,
        }
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_path(mut self, path: Vec<GeoPoint>) -> Self {
        self.path = path;
        self
    }

    pub fn with_capacity_tbps(mut self, capacity_tbps: f64) -> Self {
        self.capacity_tbps = Some(capacity_tbps);
        self
    }

    pub fn with_owners(mut self, owners: Vec<String>) -> Self {
        self.owners = owners;
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_observed_at(mut self, observed_at: UtcDateTime) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn stamped(mut self, confidence: f64, freshness: Freshness, estimated: bool) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self.freshness = freshness;
        self.estimated = estimated;
        self
    }

    /// Fraction of the expected fields that are present: coordinates
    /// (point or route), capacity, ownership and observation timestamp.
    pub fn completeness(&self) -> f64 {
        let present = [
            self.location.is_some() || !self.path.is_empty(),
            self.capacity_tbps.is_some(),
            !self.owners.is_empty(),
            self.observed_at.is_some(),
        ];
        present.iter().filter(|flag| **flag).count() as f64 * 0.25
    }

    /// Per-record confidence: the source's base confidence scaled by
    /// completeness, never below half the base.
    pub fn quality_score(&self, base_confidence: f64) -> f64 {
        let score = base_confidence * (0.5 + 0.5 * self.completeness());
        (score * 1_000.0).round() / 1_000.0
    }

    /// Field names that were filled in by estimation rather than observed.
    pub fn estimated_fields(&self) -> Vec<String> {
        self.attributes
            .get("estimated_fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn mark_estimated_field(&mut self, field: &str) {
        let entry = self
            .attributes
            .entry(String::from("estimated_fields"))
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(fields) = entry {
            if !fields.iter().any(|value| value.as_str() == Some(field)) {
                fields.push(Value::String(field.to_owned()));
            }
        }
    }
}
