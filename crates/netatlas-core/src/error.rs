use thiserror::Error;

/// Validation and contract errors exposed by `netatlas-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid dataset kind '{value}', expected one of cables, ixps, datacenters, attacks")]
    InvalidDatasetKind { value: String },
    #[error("invalid source '{value}', expected one of telegeography, peeringdb, radar")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("query parameter name cannot be empty")]
    EmptyQueryParam,
    #[error("query parameter '{name}' must be a scalar value")]
    NonScalarQueryParam { name: String },
    #[error("query must be a JSON object")]
    QueryNotObject,

    #[error("field '{field}' must be within [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistent cache error: {0}")]
    Store(#[from] netatlas_store::StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}
