//! Error types and their HTTP mapping

use crate::types::META_MEDIA_TYPE;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use harbour_signer::SignerError;
use thiserror::Error;

/// API error type
///
/// Every metadata or signing failure ends here and becomes a status code;
/// nothing is retried.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Object unknown, metadata service unreachable, or body unusable
    #[error("Not Found")]
    NotFound,

    /// Verb and `Accept` header select no behavior
    #[error("Not Found")]
    NoRoute,

    /// Register body could not be parsed
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// Oid or path segment cannot name an object
    #[error("invalid object id: {0}")]
    InvalidOid(String),

    /// The metadata service denied write access
    #[error("Forbidden")]
    Forbidden,

    /// Bytes are never accepted through the gateway
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// Capability signing failed
    #[error("signing error: {0}")]
    Signer(#[from] SignerError),
}

impl ApiError {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::NoRoute | Self::MalformedBody(_) | Self::InvalidOid(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            // The metadata service vouched for an oid we cannot shard
            Self::Signer(SignerError::InvalidOid(_)) => StatusCode::NOT_FOUND,
            Self::Signer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::Signer(e) => tracing::error!(error = %e, "failed to issue capability"),
            Self::MalformedBody(e) => tracing::warn!(error = %e, "rejected malformed body"),
            Self::InvalidOid(oid) => tracing::debug!(oid = %oid, "rejected invalid object id"),
            _ => {}
        }

        // Causes stay in the logs; clients only see the status reason
        let message = status.canonical_reason().unwrap_or("Error");
        let body = serde_json::json!({ "message": message }).to_string();

        (status, [(header::CONTENT_TYPE, META_MEDIA_TYPE)], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NoRoute.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::MalformedBody("eof".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let response = ApiError::MalformedBody("expected value".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"message":"Not Found"}"#);
    }
}
