//! Error types for vecquery.
//!
//! This module defines a unified error enum covering every failure category
//! in the workspace: configuration, embedding service, vector index,
//! bounded waits, workflow state, I/O and serialization.

use thiserror::Error;

/// Unified error type for vecquery.
///
/// All fallible functions return `Result<T, AppError>`.
/// Library code never panics; errors are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing credentials or invalid settings. Raised before any remote call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote embedding call failed or returned an unusable result
    #[error("Embedding service error: {0}")]
    Embedding(String),

    /// Vector index create/upsert/query/delete failure
    #[error("Index operation error: {0}")]
    Index(String),

    /// The named index does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// A bounded wait (readiness, write visibility) expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid workflow transition or user input
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error reports an index that is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::IndexNotFound(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = AppError::Config("PINECONE_API_KEY not set".to_string());
        assert_eq!(err.to_string(), "Configuration error: PINECONE_API_KEY not set");

        let err = AppError::IndexNotFound("article-index".to_string());
        assert_eq!(err.to_string(), "Index not found: article-index");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
        assert!(!err.is_not_found());
    }
}
