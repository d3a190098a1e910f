//! Error types for the memory subsystem.

use std::fmt;

use thiserror::Error;

/// Stable classification for collaborator (store, index) failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AdapterErrorCode {
    /// The backing store cannot be reached or opened.
    StoreUnavailable,
    /// The requested vector index does not exist.
    IndexNotFound,
    /// A vector does not match the index dimension.
    DimensionMismatch,
    /// The referenced thread does not exist.
    ThreadNotFound,
    /// Generic storage failure (constraint, query, transaction).
    Storage,
    /// Persisted data could not be decoded.
    Corrupted,
}

impl AdapterErrorCode {
    /// Stable string form, safe to surface to callers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::IndexNotFound => "INDEX_NOT_FOUND",
            Self::DimensionMismatch => "DIMENSION_MISMATCH",
            Self::ThreadNotFound => "THREAD_NOT_FOUND",
            Self::Storage => "STORAGE_ERROR",
            Self::Corrupted => "CORRUPTED_DATA",
        }
    }
}

impl fmt::Display for AdapterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed metadata filter.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// Classified store or index failure.
    #[error("{code}: {message}")]
    Adapter {
        /// Stable error code.
        code: AdapterErrorCode,
        /// Human-readable detail.
        message: String,
    },
    /// Scoring model call failed.
    #[error("scoring model error: {0}")]
    Scoring(String),
    /// Scoring model call exceeded its deadline.
    #[error("scoring model timed out after {0} ms")]
    ScoringTimeout(u64),
    /// Internal processing failure inside a pipeline stage.
    #[error("processing error: {0}")]
    Processing(String),
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] rig::embeddings::EmbeddingError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl MemoryError {
    /// Build a classified adapter error.
    pub fn adapter(code: AdapterErrorCode, message: impl Into<String>) -> Self {
        Self::Adapter {
            code,
            message: message.into(),
        }
    }

    /// Stable error code for every variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::Adapter { code, .. } => code.as_str(),
            Self::Scoring(_) | Self::Completion(_) => "SCORING_FAILED",
            Self::ScoringTimeout(_) => "SCORING_TIMEOUT",
            Self::Processing(_) => "PROCESSING_FAILED",
            Self::Embedding(_) | Self::HttpClient(_) => "EMBEDDING_FAILED",
            Self::Serialization(_) => "SERIALIZATION_FAILED",
            Self::Url(_) => "INVALID_CONFIG",
        }
    }

    /// Whether the error was raised by boundary validation, before any I/O.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::InvalidFilter(_) | Self::Url(_)
        )
    }
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_expose_stable_codes() {
        let err = MemoryError::adapter(AdapterErrorCode::IndexNotFound, "no index 'msgs'");
        assert_eq!(err.code(), "INDEX_NOT_FOUND");
        assert_eq!(err.to_string(), "INDEX_NOT_FOUND: no index 'msgs'");
        assert!(!err.is_config_error());
    }

    #[test]
    fn config_errors_are_flagged() {
        assert!(MemoryError::InvalidConfig("x".to_string()).is_config_error());
        assert!(MemoryError::InvalidFilter("x".to_string()).is_config_error());
        assert_eq!(MemoryError::ScoringTimeout(50).code(), "SCORING_TIMEOUT");
    }
}
