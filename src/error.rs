//! Error types for the AI gateway
//!
//! Every failure the gateway can produce is an [`AiError`]. Each variant maps
//! to exactly one [`ErrorKind`], which is what retry decisions are made on.
//! Uses `thiserror` for the `Display` and `Error` implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Classification
// ============================================================================

/// Closed classification of gateway failures.
///
/// The retry executor only ever performs a membership test against a set of
/// kinds; it never inspects error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 401/403, or a required credential is missing
    Auth,
    /// 429
    RateLimit,
    /// 408/504, or the request timed out before a response arrived
    Timeout,
    /// 5xx, or a network failure before a response arrived
    Transient,
    /// Success status with a body that does not match the expected shape
    ResponseParse,
    /// Any other non-success status
    Provider,
    /// Invalid configuration, disabled gateway, empty input
    Config,
    /// The provider cannot stream; the gateway degrades to a whole response
    StreamingUnsupported,
    /// Catch-all
    Gateway,
}

impl ErrorKind {
    /// Kinds the gateway retries on the whole-response path.
    pub const RETRYABLE: &'static [ErrorKind] =
        &[ErrorKind::Transient, ErrorKind::Timeout, ErrorKind::RateLimit];

    /// Returns `true` if this kind is in [`ErrorKind::RETRYABLE`].
    pub fn is_retryable(self) -> bool {
        Self::RETRYABLE.contains(&self)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::ResponseParse => "response_parse",
            ErrorKind::Provider => "provider",
            ErrorKind::Config => "config",
            ErrorKind::StreamingUnsupported => "streaming_unsupported",
            ErrorKind::Gateway => "gateway",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for gateway operations.
///
/// Cloneable so that a fixed error can be replayed (the mock provider) and so
/// that the last retryable failure can be surfaced after the final attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AiError {
    /// Authentication failed or credential missing
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Provider rate limit hit
    #[error("Rate limit error: {0}")]
    RateLimit(String),

    /// Request timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Temporary server or network failure
    #[error("Transient error: {0}")]
    Transient(String),

    /// Response body could not be parsed into the expected shape
    #[error("Response parse error: {0}")]
    ResponseParse(String),

    /// Provider returned an unclassified non-success status
    #[error("Provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Configuration-related errors (invalid values, unknown provider, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The gateway is switched off in configuration
    #[error("Configuration error: AI gateway is disabled")]
    Disabled,

    /// A chat call was made with no messages
    #[error("Configuration error: messages cannot be empty")]
    EmptyInput,

    /// The provider has no streaming endpoint
    #[error("Streaming not supported by provider {0}")]
    StreamingUnsupported(String),

    /// Catch-all gateway failure
    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl AiError {
    /// Classification tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AiError::Auth(_) => ErrorKind::Auth,
            AiError::RateLimit(_) => ErrorKind::RateLimit,
            AiError::Timeout(_) => ErrorKind::Timeout,
            AiError::Transient(_) => ErrorKind::Transient,
            AiError::ResponseParse(_) => ErrorKind::ResponseParse,
            AiError::Provider { .. } => ErrorKind::Provider,
            AiError::Config(_) | AiError::Disabled | AiError::EmptyInput => ErrorKind::Config,
            AiError::StreamingUnsupported(_) => ErrorKind::StreamingUnsupported,
            AiError::Gateway(_) => ErrorKind::Gateway,
        }
    }

    /// HTTP status carried by a [`AiError::Provider`] error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AiError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify a transport-level failure that happened before any response
    /// was received (or while reading a streamed body).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout(format!("request timed out: {}", err))
        } else {
            AiError::Transient(format!("network error: {}", err))
        }
    }

    /// The one place user-facing text is produced.
    ///
    /// Callers format a caught error with this and may then fall back to a
    /// locally computed result.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Auth => "⚠️ AI authentication failed, please check the API key",
            ErrorKind::RateLimit => "⚠️ AI is being called too often, please try again later",
            ErrorKind::Timeout => "⚠️ AI response timed out, please retry",
            ErrorKind::Transient => "⚠️ AI network error, please try again later",
            ErrorKind::ResponseParse => "⚠️ AI response format error",
            ErrorKind::Provider => "⚠️ AI service is temporarily unavailable",
            ErrorKind::Config => "⚠️ AI feature is not available",
            ErrorKind::StreamingUnsupported | ErrorKind::Gateway => "⚠️ AI call failed",
        }
    }
}

/// A specialized `Result` type for gateway operations.
pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AiError::Config("temperature must be between 0 and 2".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: temperature must be between 0 and 2"
        );
        let err = AiError::Provider {
            status: 418,
            message: "teapot".into(),
        };
        assert_eq!(err.to_string(), "Provider error (HTTP 418): teapot");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AiError::Auth("x".into()).kind(), ErrorKind::Auth);
        assert_eq!(AiError::RateLimit("x".into()).kind(), ErrorKind::RateLimit);
        assert_eq!(AiError::Timeout("x".into()).kind(), ErrorKind::Timeout);
        assert_eq!(AiError::Transient("x".into()).kind(), ErrorKind::Transient);
        assert_eq!(
            AiError::ResponseParse("x".into()).kind(),
            ErrorKind::ResponseParse
        );
        assert_eq!(AiError::Disabled.kind(), ErrorKind::Config);
        assert_eq!(AiError::EmptyInput.kind(), ErrorKind::Config);
        assert_eq!(
            AiError::StreamingUnsupported("mock".into()).kind(),
            ErrorKind::StreamingUnsupported
        );
        assert_eq!(AiError::Gateway("x".into()).kind(), ErrorKind::Gateway);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());

        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::ResponseParse.is_retryable());
        assert!(!ErrorKind::Provider.is_retryable());
        assert!(!ErrorKind::Config.is_retryable());
    }

    #[test]
    fn test_status_code() {
        let err = AiError::Provider {
            status: 404,
            message: "model not found".into(),
        };
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(AiError::RateLimit("x".into()).status_code(), None);
    }

    #[test]
    fn test_user_message_is_stable_per_kind() {
        assert_eq!(
            AiError::Auth("missing api key".into()).user_message(),
            AiError::Auth("HTTP 401".into()).user_message()
        );
        assert_ne!(
            AiError::Timeout("x".into()).user_message(),
            AiError::Transient("x".into()).user_message()
        );
        assert!(AiError::ResponseParse("x".into())
            .user_message()
            .contains("format"));
        assert_eq!(AiError::Disabled.user_message(), AiError::EmptyInput.user_message());
    }
}
