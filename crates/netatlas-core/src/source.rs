use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical upstream provider identifiers used in result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "telegeography")]
    TeleGeography,
    #[serde(rename = "peeringdb")]
    PeeringDb,
    #[serde(rename = "radar")]
    CloudflareRadar,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::TeleGeography, Self::PeeringDb, Self::CloudflareRadar];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TeleGeography => "telegeography",
            Self::PeeringDb => "peeringdb",
            Self::CloudflareRadar => "radar",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "telegeography" => Ok(Self::TeleGeography),
            "peeringdb" => Ok(Self::PeeringDb),
            "radar" | "cloudflare" => Ok(Self::CloudflareRadar),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
