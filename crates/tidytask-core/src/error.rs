//! Error types for tidytask.
//!
//! The enrichment pipeline reasons about three failure classes: storage
//! failures, external (model) service failures, and parse failures. The
//! `is_*` helpers map the concrete variants onto those classes.

use thiserror::Error;

/// Result type alias using tidytask's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tidytask operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-database storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Task not found (or not owned by the given owner)
    #[error("Task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    /// Completion service call failed permanently
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Completion service call failed with a transient condition
    /// (timeout, connection failure, rate limit, 5xx)
    #[error("External service unavailable: {0}")]
    Unavailable(String),

    /// Model output was not valid structured data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Realtime publish failed
    #[error("Publish error: {0}")]
    Publish(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Storage read/write failure (the record store, preferences, tiers, usage).
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Storage(_))
    }

    /// Completion service failure of either kind.
    pub fn is_external(&self) -> bool {
        matches!(self, Error::ExternalService(_) | Error::Unavailable(_))
    }

    /// Model output could not be parsed.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Worth one more attempt after a short backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// Missing task or other resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::TaskNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::Unavailable(e.to_string())
        } else {
            Error::ExternalService(e.to_string())
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Publish(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_task_not_found() {
        let id = Uuid::nil();
        let err = Error::TaskNotFound(id);
        assert_eq!(err.to_string(), format!("Task not found: {}", id));
    }

    #[test]
    fn test_error_display_external_service() {
        let err = Error::ExternalService("bad request".to_string());
        assert_eq!(err.to_string(), "External service error: bad request");
    }

    #[test]
    fn test_error_display_parse() {
        let err = Error::Parse("expected value".to_string());
        assert_eq!(err.to_string(), "Parse error: expected value");
    }

    #[test]
    fn test_classification_storage() {
        assert!(Error::Storage("disk".into()).is_storage());
        assert!(Error::Database(sqlx::Error::RowNotFound).is_storage());
        assert!(!Error::Parse("x".into()).is_storage());
    }

    #[test]
    fn test_classification_external() {
        assert!(Error::ExternalService("x".into()).is_external());
        assert!(Error::Unavailable("x".into()).is_external());
        assert!(!Error::Publish("x".into()).is_external());
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(Error::Unavailable("timeout".into()).is_transient());
        assert!(!Error::ExternalService("401".into()).is_transient());
        assert!(!Error::Parse("x".into()).is_transient());
        assert!(!Error::Storage("x".into()).is_transient());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::TaskNotFound(Uuid::new_v4()).is_not_found());
        assert!(Error::NotFound("account".into()).is_not_found());
        assert!(!Error::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error_is_parse() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.is_parse());
        assert!(err.to_string().starts_with("Parse error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
