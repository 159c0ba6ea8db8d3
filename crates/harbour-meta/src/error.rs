//! Metadata client error types

use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, MetaError>;

/// Reasons a metadata call produced no usable answer
#[derive(Error, Debug)]
pub enum MetaError {
    /// The request did not complete within the configured deadline
    #[error("metadata request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or protocol failure talking to the metadata service
    #[error("metadata transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The metadata service answered with a body we could not decode
    #[error("invalid metadata response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured endpoint cannot address objects
    #[error("invalid metadata endpoint: {0}")]
    Endpoint(String),

    /// A user, repo or oid segment cannot be used in a metadata path
    #[error("invalid object key segment: {0:?}")]
    InvalidKey(String),
}

impl MetaError {
    /// Short, stable label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Endpoint(_) => "endpoint",
            Self::InvalidKey(_) => "invalid_key",
        }
    }
}
