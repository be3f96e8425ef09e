use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Logical dataset categories, each governed by its own invalidation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetKind {
    #[serde(rename = "cables")]
    Cables,
    #[serde(rename = "ixps")]
    ExchangePoints,
    #[serde(rename = "datacenters")]
    DataCenters,
    #[serde(rename = "attacks")]
    AttackTelemetry,
}

impl DatasetKind {
    pub const ALL: [Self; 4] = [
        Self::Cables,
        Self::ExchangePoints,
        Self::DataCenters,
        Self::AttackTelemetry,
    ];

    /// Stable short name, also used as the cache key prefix.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cables => "cables",
            Self::ExchangePoints => "ixps",
            Self::DataCenters => "datacenters",
            Self::AttackTelemetry => "attacks",
        }
    }
}

impl Display for DatasetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cables" => Ok(Self::Cables),
            "ixps" => Ok(Self::ExchangePoints),
            "datacenters" => Ok(Self::DataCenters),
            "attacks" => Ok(Self::AttackTelemetry),
            other => Err(ValidationError::InvalidDatasetKind {
                value: other.to_owned(),
            }),
        }
    }
}
