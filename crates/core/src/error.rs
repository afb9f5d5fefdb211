//! Error taxonomy shared across the ShopGraph crates
//!
//! Every adapter maps its backend errors into one of these kinds so that
//! callers can make uniform decisions: admission turns kinds into HTTP
//! statuses, projector workers use `is_retryable` to drive the retry flow,
//! and the orchestrator degrades per-source failures to empty results.

use thiserror::Error;

/// Unified error type for ShopGraph operations
#[derive(Debug, Error)]
pub enum ShopGraphError {
    /// Malformed or unauthenticated request; never retried
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Unknown entity; treated as an empty result by recommendation sources
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Could not reach a backing store or the broker
    #[error("{backend} unavailable: {message}")]
    BackendUnavailable { backend: &'static str, message: String },

    /// A backing store accepted the call and then failed it
    #[error("{backend} failure: {message}")]
    BackendFailure { backend: &'static str, message: String },

    /// Retry budget exceeded; the message is routed to the dead-letter queue
    #[error("retries exhausted: {message}")]
    Exhausted { message: String },

    /// Invariant violation in our own logic; never retried
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Bad or missing configuration value
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ShopGraphError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn unavailable(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            message: message.into(),
        }
    }

    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>, key: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: key.map(String::from),
        }
    }

    /// Whether a projector worker should re-attempt the operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::BackendFailure { .. }
        )
    }
}

/// Result type alias for ShopGraph operations
pub type Result<T> = std::result::Result<T, ShopGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ShopGraphError::unavailable("graph", "refused").is_retryable());
        assert!(ShopGraphError::backend("vector", "timeout").is_retryable());
    }

    #[test]
    fn test_non_retryable_kinds() {
        assert!(!ShopGraphError::invalid_input("bad event_type").is_retryable());
        assert!(!ShopGraphError::not_found("product 42").is_retryable());
        assert!(!ShopGraphError::internal("broken invariant").is_retryable());
        assert!(!ShopGraphError::Exhausted {
            message: "3 attempts".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_display_includes_backend() {
        let err = ShopGraphError::unavailable("broker", "connection refused");
        assert_eq!(err.to_string(), "broker unavailable: connection refused");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: ShopGraphError = parse.unwrap_err().into();
        assert!(matches!(err, ShopGraphError::Serialization(_)));
        assert!(!err.is_retryable());
    }
}
