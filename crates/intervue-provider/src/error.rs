//! Error types for model provider calls.
//!
//! Every transport, vendor or decoding failure is surfaced as a single
//! [`ProviderError`] carrying a [`ProviderErrorKind`] and the original cause.

use serde::Deserialize;

/// A specialized `Result` type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Categories of provider failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The call exceeded the configured per-call timeout.
    Timeout,
    /// The vendor answered but the body could not be understood.
    InvalidResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ProviderErrorKind {
    /// Classifies an HTTP status code returned by a vendor API.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// Error body shape shared by the vendor APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// A failed call to a model or transcription provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} provider error ({kind}): {message}")]
pub struct ProviderError {
    /// Name of the provider that failed (e.g. "openai").
    pub provider: String,
    /// Failure category.
    pub kind: ProviderErrorKind,
    /// The original cause, as reported by the transport or vendor.
    pub message: String,
}

impl ProviderError {
    /// Creates a new `ProviderError`.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Wraps a `reqwest` transport error.
    #[must_use]
    pub fn from_reqwest(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ProviderErrorKind::Network
        } else if err.is_decode() {
            ProviderErrorKind::InvalidResponse
        } else if let Some(status) = err.status() {
            ProviderErrorKind::from_status(status.as_u16())
        } else {
            ProviderErrorKind::Other
        };
        Self::new(provider, kind, err.to_string())
    }

    /// Classifies a non-success vendor answer, preferring the vendor's own
    /// message when the body carries one.
    #[must_use]
    pub fn from_vendor_body(provider: impl Into<String>, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map_or_else(|_| body.to_string(), |e| e.error.message);
        Self::new(
            provider,
            ProviderErrorKind::from_status(status),
            format!("HTTP {status}: {message}"),
        )
    }

    /// Consumes a non-success vendor response.
    pub async fn from_response(provider: impl Into<String>, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::from_vendor_body(provider, status, &body)
    }

    /// Returns `true` if a manual retry of the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimit
                | ProviderErrorKind::Server
                | ProviderErrorKind::Network
                | ProviderErrorKind::Timeout
        )
    }
}
