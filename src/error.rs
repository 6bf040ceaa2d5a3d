//! Error types for the Nestfeed client core.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the concurrency and caching core.
///
/// Task errors never pass through this type unless the task itself chose
/// `CoreError` as its error type; the generic entry points only require
/// `E: From<CoreError>` so that the core can raise its own variants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Deadline exceeded for {operation} after {timeout:?}")]
    DeadlineExceeded {
        operation: String,
        timeout: Duration,
    },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Construction error: {0}")]
    Construction(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Limiter closed: {0}")]
    LimiterClosed(String),
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl CoreError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, CoreError::DeadlineExceeded { .. })
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, CoreError::Upstream(_))
    }
}

impl From<::config::ConfigError> for CoreError {
    fn from(error: ::config::ConfigError) -> Self {
        CoreError::Configuration(error.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        CoreError::Serialization(error.to_string())
    }
}

/// Error reported by the hosted data backend.
///
/// Opaque to the core: it is carried to the caller exactly as the
/// [`RelationSource`](crate::source::RelationSource) produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Upstream error during {operation}: {message}")]
pub struct UpstreamError {
    pub operation: String,
    pub message: String,
    pub code: Option<String>,
}

impl UpstreamError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_passes_through_display() {
        let upstream = UpstreamError::new("list_memberships", "connection reset").with_code("PGRST301");
        let error: CoreError = upstream.clone().into();

        assert!(error.is_upstream());
        assert_eq!(error.to_string(), upstream.to_string());
        assert_eq!(error, CoreError::Upstream(upstream));
    }

    #[test]
    fn test_json_failure_is_a_serialization_error() {
        let json_error = serde_json::from_str::<u8>("not json").unwrap_err();

        let error: CoreError = json_error.into();

        assert!(matches!(error, CoreError::Serialization(_)));
        assert!(error.to_string().starts_with("Serialization error: "));
    }

    #[test]
    fn test_deadline_exceeded_display() {
        let error = CoreError::DeadlineExceeded {
            operation: "find_owned_resource".to_string(),
            timeout: Duration::from_millis(50),
        };

        assert!(error.is_deadline_exceeded());
        assert_eq!(
            error.to_string(),
            "Deadline exceeded for find_owned_resource after 50ms"
        );
    }
}
