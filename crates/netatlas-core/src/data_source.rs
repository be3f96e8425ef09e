//! Data source trait and adapter error types.
//!
//! This module defines the adapter contract ([`DataSource`]) that every
//! upstream integration follows, together with the structured
//! [`SourceError`] the orchestrator branches on.
//!
//! # Error taxonomy
//!
//! | Kind | Retryable | Meaning |
//! |------|-----------|---------|
//! | `Transport` | yes | Connection failure or unreadable body |
//! | `Server` | yes | Upstream status 5xx |
//! | `RateLimited` | yes | Upstream status 429 or local budget exhausted |
//! | `Timeout` | no | Per-adapter deadline elapsed |
//! | `Client` | no | Upstream status 4xx other than 429 |
//! | `BreakerOpen` | no | Circuit open, upstream never contacted |
//! | `InvalidResponse` | no | Body did not match the expected shape |
//! | `InvalidRequest` | no | Request rejected before sending |
//! | `Internal` | no | Programming error |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::circuit_breaker::{BreakerOpen, CircuitBreakerSnapshot};
use crate::http_client::{HttpError, HttpErrorKind};
use crate::retry::Retryable;
use crate::{DataResult, DatasetKind, ProviderId, QueryParams};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorKind {
    Transport,
    Timeout,
    Server,
    RateLimited,
    Client,
    BreakerOpen,
    InvalidResponse,
    InvalidRequest,
    Internal,
}

/// Structured source error propagated unchanged through retry and breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    status: Option<u16>,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidResponse, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, message)
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => SourceErrorKind::RateLimited,
            500..=599 => SourceErrorKind::Server,
            400..=499 => SourceErrorKind::Client,
            _ => SourceErrorKind::InvalidResponse,
        };
        Self {
            kind,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn unsupported_dataset(provider: ProviderId, kind: DatasetKind) -> Self {
        Self::invalid_request(format!(
            "dataset '{kind}' is not served by source '{provider}'"
        ))
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Transport | SourceErrorKind::Server | SourceErrorKind::RateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Transport => "source.transport",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Server => "source.server",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Client => "source.client",
            SourceErrorKind::BreakerOpen => "source.breaker_open",
            SourceErrorKind::InvalidResponse => "source.invalid_response",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        self.retryable()
    }
}

impl From<BreakerOpen> for SourceError {
    fn from(error: BreakerOpen) -> Self {
        Self::new(SourceErrorKind::BreakerOpen, error.to_string())
    }
}

impl From<HttpError> for SourceError {
    fn from(error: HttpError) -> Self {
        match error.kind() {
            HttpErrorKind::Timeout => Self::timeout(error.message()),
            HttpErrorKind::Connect | HttpErrorKind::Body | HttpErrorKind::Other => {
                Self::transport(error.message())
            }
        }
    }
}

/// Health state reported by adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime adapter health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdapterHealth {
    pub provider: ProviderId,
    pub state: HealthState,
    pub breaker: CircuitBreakerSnapshot,
    /// Calls left in the current rate window.
    pub rate_tokens_remaining: u32,
    pub rate_window_resets_at_ms: i64,
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Adapter contract implemented by every live upstream integration.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Dataset kinds this source can serve.
    fn datasets(&self) -> &'static [DatasetKind];

    fn fetch<'a>(&'a self, kind: DatasetKind, query: &'a QueryParams)
        -> SourceFuture<'a, DataResult>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = AdapterHealth> + Send + 'a>>;

    fn supports(&self, kind: DatasetKind) -> bool {
        self.datasets().contains(&kind)
    }
}
