use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};

use crate::{DatasetKind, ProviderId};

/// Rung of the fallback chain an attempt was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptSource {
    Cache,
    LiveApi(ProviderId),
    StaleCache,
    Fallback,
}

impl AttemptSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::LiveApi(_) => "live-api",
            Self::StaleCache => "stale-cache",
            Self::Fallback => "fallback",
        }
    }
}

impl Display for AttemptSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LiveApi(provider) => write!(f, "live-api({provider})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for AttemptSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAttempt {
    pub source: AttemptSource,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Diagnostics for one top-level call of a dataset kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAttemptLog {
    pub kind: DatasetKind,
    pub started_at_ms: i64,
    pub attempts: Vec<SourceAttempt>,
}

impl SourceAttemptLog {
    pub fn new(kind: DatasetKind, started_at_ms: i64) -> Self {
        Self {
            kind,
            started_at_ms,
            attempts: Vec::new(),
        }
    }

    pub fn succeeded(&mut self, source: AttemptSource) {
        self.attempts.push(SourceAttempt {
            source,
            success: true,
            error: None,
        });
    }

    pub fn failed(&mut self, source: AttemptSource, error: impl Into<String>) {
        self.attempts.push(SourceAttempt {
            source,
            success: false,
            error: Some(error.into()),
        });
    }

    /// Source of the attempt that produced the returned data.
    pub fn served_by(&self) -> Option<AttemptSource> {
        self.attempts
            .iter()
            .rev()
            .find(|attempt| attempt.success)
            .map(|attempt| attempt.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_failures_then_success() {
        let mut log = SourceAttemptLog::new(DatasetKind::Cables, 10);
        log.failed(AttemptSource::LiveApi(ProviderId::TeleGeography), "timeout");
        log.succeeded(AttemptSource::Fallback);

        assert_eq!(log.served_by(), Some(AttemptSource::Fallback));
        let encoded = serde_json::to_value(&log).expect("encode");
        assert_eq!(encoded["attempts"][0]["source"], "live-api(telegeography)");
        assert_eq!(encoded["attempts"][0]["error"], "timeout");
        assert!(encoded["attempts"][1].get("error").is_none());
    }
}
