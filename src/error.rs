//! Error types for postbox.
//!
//! The default broker surface never returns errors: missing topics and
//! non-writable targets are silent no-ops. These errors exist for the strict
//! (`try_*`) variants, serializer failures and stream subscriptions, so callers
//! that want to know *why* nothing happened can pattern match on it.

use thiserror::Error;

/// Top-level error type for postbox.
#[derive(Debug, Error)]
pub enum PostboxError {
    #[error("Topic is missing or empty")]
    MissingTopic,

    #[error("Reactive value bound to topic '{topic}' is not writable")]
    NotWritable {
        topic: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Serializer error: {message}")]
    Serializer {
        message: String,
    },

    #[error("Stream for topic '{topic}' is disconnected")]
    Disconnected {
        topic: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

impl PostboxError {
    /// Creates a serializer error from any message.
    #[must_use]
    pub fn serializer(message: impl Into<String>) -> Self {
        Self::Serializer {
            message: message.into(),
        }
    }

    /// Returns true if this error describes a silent no-op of the default surface.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::MissingTopic | Self::NotWritable { .. })
    }

    /// Returns true if this is a serialization error.
    #[must_use]
    pub const fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Serializer { .. })
    }

    /// Returns true if waiting again could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for postbox operations.
pub type PostboxResult<T> = Result<T, PostboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_writable_message() {
        let err = PostboxError::NotWritable {
            topic: "section".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("section"));
        assert!(msg.contains("not writable"));
        assert!(err.is_noop());
    }

    #[test]
    fn test_missing_topic_is_noop() {
        assert!(PostboxError::MissingTopic.is_noop());
        assert!(!PostboxError::MissingTopic.is_retryable());
    }

    #[test]
    fn test_serializer_error() {
        let err = PostboxError::serializer("cyclic value");
        assert!(err.is_serialization());
        assert!(!err.is_noop());
        assert!(format!("{err}").contains("cyclic value"));
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PostboxError = json_err.into();
        assert!(err.is_serialization());
    }

    #[test]
    fn test_timeout_retryable() {
        let err = PostboxError::Timeout { duration_ms: 250 };
        assert!(err.is_retryable());
        assert!(format!("{err}").contains("250ms"));
    }
}
