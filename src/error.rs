//! Error types for the recommendation pipeline.
//!
//! Callers can tell apart three situations:
//! - bad input (`InvalidInput`, `MalformedDecomposition`), which retrying will not fix
//! - a collaborator being down (`UpstreamUnavailable`), where the whole request may be retried
//! - missing evidence records (`DataIntegrity`), which are reported next to a successful result

use serde::Serialize;
use thiserror::Error;

/// Result type for recommendation operations.
pub type Result<T> = std::result::Result<T, RecommendError>;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed query decomposition: {0}")]
    MalformedDecomposition(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityIssue),

    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable {
        service: &'static str,
        message: String,
    },
}

impl RecommendError {
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        RecommendError::UpstreamUnavailable {
            service,
            message: err.to_string(),
        }
    }

    /// Only collaborator outages are worth repeating the request for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecommendError::UpstreamUnavailable { .. })
    }
}

impl From<sqlx::Error> for RecommendError {
    fn from(err: sqlx::Error) -> Self {
        RecommendError::upstream("record store", err)
    }
}

impl From<qdrant_client::QdrantError> for RecommendError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        RecommendError::upstream("vector index", err)
    }
}

/// A lookup during evidence resolution that found no record.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DataIntegrityIssue {
    #[error("review sentence {0} has no stored metadata")]
    MissingSentence(String),

    #[error("review sentence {0} has no review_id")]
    SentenceWithoutReview(String),

    #[error("review {0} not found in record store")]
    MissingReview(String),

    #[error("course {0} not found in record store")]
    MissingCourse(String),
}
