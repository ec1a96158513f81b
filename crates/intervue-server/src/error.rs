//! Error types for the Intervue server.
//!
//! Every fallible operation in the server returns [`IntervueError`]. The
//! variant decides the HTTP status a handler answers with, so domain code
//! never deals with status codes directly.

use std::path::PathBuf;

use axum::http::StatusCode;
use intervue_provider::ProviderError;
use intervue_sandbox::SandboxError;

/// A specialized `Result` type for Intervue server operations.
pub type Result<T> = std::result::Result<T, IntervueError>;

/// Errors that can occur while serving Intervue requests.
#[derive(Debug, thiserror::Error)]
pub enum IntervueError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your intervue.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Domain Errors
    // ========================================================================
    /// A record is absent, or is not owned by the caller.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The request payload is malformed or out of range.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request is well-formed but not allowed in the current state.
    #[error("{0}")]
    BusinessRule(String),

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// Missing, unknown or expired credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The model provider failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The code sandbox rejected or failed a run.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Every queue slot is taken.
    #[error("Job queue is full\n\nSuggestion: Retry shortly")]
    QueueFull,

    /// The background job queue is no longer accepting work.
    #[error("Job queue is closed\n\nSuggestion: Restart the server")]
    QueueClosed,

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntervueError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new `BusinessRule` error.
    #[must_use]
    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRule(message.into())
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::BusinessRule(_) | Self::InvalidStateTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Sandbox(e) if !e.is_infrastructure() => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the caller caused this error.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Returns `true` if this error is fatal at startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use intervue_provider::ProviderErrorKind;

    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = IntervueError::config_validation("server.workers must be positive", "Set it to 4");
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("Suggestion: Set it to 4"));

        let err = IntervueError::not_found("Assessment", "abc");
        assert_eq!(err.to_string(), "Assessment not found: abc");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            IntervueError::not_found("Feedback", "x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IntervueError::validation("count").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IntervueError::business_rule("already generated").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IntervueError::invalid_transition("completed", "pending").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IntervueError::unauthorized("missing token").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(IntervueError::QueueClosed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(IntervueError::QueueFull.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_collaborator_status_codes() {
        let provider = ProviderError::new("openai", ProviderErrorKind::Server, "boom");
        assert_eq!(
            IntervueError::from(provider).status_code(),
            StatusCode::BAD_GATEWAY
        );

        let unsupported = SandboxError::UnsupportedLanguage("cobol".to_string());
        assert_eq!(
            IntervueError::from(unsupported).status_code(),
            StatusCode::BAD_REQUEST
        );

        let broken = SandboxError::MissingExitStatus;
        assert_eq!(
            IntervueError::from(broken).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_is_fatal() {
        assert!(IntervueError::config_parse("intervue.json", "eof").is_fatal());
        assert!(!IntervueError::validation("bad").is_fatal());
        assert!(IntervueError::validation("bad").is_client_error());
    }
}
