//! Error taxonomy for the request-execution pipeline.
//!
//! Every failure mode the pipeline can produce is a variant here, tagged
//! end-to-end rather than inferred from a status-code or string match (see
//! `DESIGN.md`, re-architecture note on retry classification).

use std::time::Duration;

/// The upstream JSON error envelope: `{code, message, type, status, context}`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<u16>,
    pub context: Option<serde_json::Value>,
}

/// Everything that can go wrong executing one logical API call.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    /// The caller's cancellation signal fired before the call completed.
    #[error("request cancelled")]
    ContextCancelled,

    /// The endpoint's circuit breaker is open.
    #[error("circuit open for endpoint {endpoint}")]
    CircuitOpen {
        /// Normalized endpoint key (see [`crate::registry::endpoint_key`]).
        endpoint: String,
    },

    /// The endpoint's circuit breaker is half-open and already at capacity.
    #[error("too many half-open probes for endpoint {endpoint}")]
    TooManyHalfOpen {
        /// Normalized endpoint key.
        endpoint: String,
    },

    /// The token provider failed to produce a usable token.
    #[error("token unavailable: {reason}")]
    TokenUnavailable {
        /// Why the provider failed, for logging only.
        reason: String,
    },

    /// The HTTP round trip itself failed (connect, TLS, I/O, transport timeout).
    #[error("transport failure: {reason}")]
    TransportFailure {
        /// Description of the transport failure, for logging only.
        reason: String,
    },

    /// The response body could not be deserialized by the caller.
    #[error("deserialization failed: {reason}")]
    Deserialization {
        /// Description of the deserialization failure.
        reason: String,
    },

    /// The upstream service returned a 4xx/5xx status.
    #[error("api error {status}: {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Machine-readable upstream error code, if present.
        code: Option<String>,
        /// Human-readable message, parsed from the envelope or synthesized.
        message: String,
        /// Parsed `Retry-After`, seconds, present only for 429 responses.
        retry_after: Option<Duration>,
    },
}

impl Error {
    pub(crate) fn api(status: u16, body: &[u8], retry_after: Option<Duration>) -> Self {
        let parsed: Option<ApiErrorBody> = serde_json::from_slice(body).ok();
        let code = parsed.as_ref().and_then(|b| b.code.clone());
        let message = parsed
            .as_ref()
            .and_then(|b| b.message.clone())
            .unwrap_or_else(|| format!("upstream returned status {status}"));
        Error::ApiError {
            status,
            code,
            message,
            retry_after,
        }
    }

    /// Status code carried by an [`Error::ApiError`], if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` for a 429 response.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// `true` for a 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// `true` for a 403 response.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// `true` for a 404 response.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// `true` for any 5xx response.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(s) if (500..600).contains(&s))
    }

    /// `true` if the pipeline's layered retry helper should retry this error.
    pub fn is_retryable_for_backoff(&self) -> bool {
        self.is_rate_limited()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
