//! Error types for the harbour-signer crate

use thiserror::Error;

/// Result type alias using `SignerError`
pub type Result<T> = std::result::Result<T, SignerError>;

/// Errors that can occur while deriving paths or issuing capabilities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The oid cannot be sharded into a storage path
    #[error("invalid oid {0:?}: expected at least 4 lowercase hex characters")]
    InvalidOid(String),

    /// The storage endpoint is not an absolute http(s) URL
    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),

    /// A credential required for signing is missing
    #[error("missing storage credential: {0}")]
    MissingCredential(&'static str),
}
