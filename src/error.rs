//! Error types for docket.

use thiserror::Error;

/// Main error type for docket operations.
///
/// Only construction and configuration surface these. Submitting a document
/// never returns an error; see [`crate::client::SubmitOutcome`].
#[derive(Error, Debug)]
pub enum DocketError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The registration endpoint is not a valid absolute URL
    #[error("Invalid endpoint URL '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Layered configuration could not be read or deserialized
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for docket operations.
pub type Result<T> = std::result::Result<T, DocketError>;
