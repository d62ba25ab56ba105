//! Error Types
//!
//! Two layers of failure exist in the routing system:
//!
//! - [`EngineError`] is what a single engine reports. Every adapter maps its
//!   transport failures (HTTP status, timeout, malformed body) into this enum
//!   so that raw `reqwest` errors never leave the adapter.
//! - [`RouterError`] is what callers of [`EngineRouter`](crate::EngineRouter)
//!   see. It wraps an `EngineError` when a backend failed and adds the
//!   configuration failures the router itself detects.

use thiserror::Error;

use crate::engine::EngineId;

/// Failure reported by a concrete engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Could not reach the backend
    #[error("connection failed: {0}")]
    Connection(String),

    /// Backend did not answer within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Backend answered with a non-success HTTP status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Credentials were rejected
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Backend is throttling us
    #[error("rate limited{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        /// Value of the `retry-after` header, when present
        retry_after_secs: Option<u64>,
    },

    /// No API key is configured for a cloud engine
    #[error("no API key configured")]
    MissingCredential,

    /// Backend answered 2xx but the body did not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Health probe reported the engine as down
    #[error("engine '{engine}' is unhealthy")]
    Unhealthy {
        /// Engine that failed its health check
        engine: EngineId,
    },

    /// Anything else (client construction, serialization)
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying later (or on another engine) may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Timeout
                | Self::RateLimited { .. }
                | Self::Unhealthy { .. }
        ) || matches!(self, Self::Status { status, .. } if *status >= 500)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            Self::Internal(e.to_string())
        }
    }
}

/// Failure surfaced by the engine router
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// `set_active` was given an identifier that is not registered
    #[error("engine '{0}' is not registered")]
    UnknownEngine(EngineId),

    /// `generate` was called before any engine was made active
    #[error("no active AI engine set")]
    NoActiveEngine,

    /// The active identifier no longer resolves in the registry
    #[error("active AI engine '{0}' not found")]
    EngineNotFound(EngineId),

    /// A backend failed; carries the engine that produced the failure
    #[error("engine '{engine}' failed: {source}")]
    Backend {
        /// Engine whose call failed
        engine: EngineId,
        /// Underlying engine failure
        #[source]
        source: EngineError,
    },

    /// The configured fallback identifier does not resolve in the registry
    #[error("fallback engine '{0}' not registered")]
    FallbackNotFound(EngineId),
}

impl RouterError {
    /// Whether the caller may reasonably retry (possibly after re-selecting
    /// an engine). The router itself never loops.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EngineNotFound(_) => true,
            Self::Backend { source, .. } => source.is_transient(),
            Self::UnknownEngine(_) | Self::NoActiveEngine | Self::FallbackNotFound(_) => false,
        }
    }

    /// Engine error underneath, if this is a backend failure
    #[must_use]
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}
