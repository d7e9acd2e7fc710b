//! Error types and result handling for the fault-injection recommender

use thiserror::Error;

/// Result type alias for recommender operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for recommender operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("Analyzer error: {0}")]
    Analyzer(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Check if the error is retryable at the transport layer
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Validation(_) => "validation",
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::Storage(_) => "storage",
            Error::Session(_) => "session",
            Error::NotFound(_) => "not_found",
            Error::Optimizer(_) => "optimizer",
            Error::Analyzer(_) => "analyzer",
            Error::Serialization(_) => "serialization",
            Error::Generic(_) => "generic",
        }
    }
}
