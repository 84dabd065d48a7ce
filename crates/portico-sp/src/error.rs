//! SP-side SAML error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type for SP operations
pub type SpResult<T> = Result<T, SpError>;

/// Validation and processing failures for inbound and outbound SAML traffic.
#[derive(Debug, Error)]
pub enum SpError {
    /// Structurally invalid message (bad base64, bad deflate, bad XML,
    /// missing required attribute or element)
    #[error("Malformed SAML message: {0}")]
    Malformed(String),

    /// Signature verification failed. The public message never carries
    /// cryptographic detail; that goes to the log only.
    #[error("Signature validation failed")]
    SignatureInvalid,

    /// Inbound message Destination does not equal the receiving endpoint
    #[error("Destination mismatch: {0}")]
    DestinationMismatch(String),

    /// Assertion audience restriction does not include this SP
    #[error("Audience mismatch: {0}")]
    AudienceMismatch(String),

    /// InResponseTo does not match an in-flight request this SP issued
    #[error("Correlation mismatch: {0}")]
    CorrelationMismatch(String),

    /// Issuer is not a registered remote provider
    #[error("Unknown issuer: {0}")]
    UnknownIssuer(String),

    /// Conditions window has passed (NotOnOrAfter, with skew)
    #[error("Message expired: {0}")]
    Expired(String),

    /// Conditions window has not opened yet (NotBefore, with skew)
    #[error("Message not yet valid: {0}")]
    NotYetValid(String),

    /// The remote provider reported a non-success status code
    #[error("Remote provider reported failure: {0}")]
    RemoteFailure(String),

    /// No provider is hosted for the requested host/alias
    #[error("No service provider hosted for alias: {0}")]
    UnknownAlias(String),

    /// Startup/reload configuration problem
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl SpError {
    /// Stable machine-readable code for the response body and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            SpError::Malformed(_) => "malformed",
            SpError::SignatureInvalid => "signature_invalid",
            SpError::DestinationMismatch(_) => "destination_mismatch",
            SpError::AudienceMismatch(_) => "audience_mismatch",
            SpError::CorrelationMismatch(_) => "correlation_mismatch",
            SpError::UnknownIssuer(_) => "unknown_issuer",
            SpError::Expired(_) => "expired",
            SpError::NotYetValid(_) => "not_yet_valid",
            SpError::RemoteFailure(_) => "remote_failure",
            SpError::UnknownAlias(_) => "unknown_alias",
            SpError::Configuration(_) => "configuration_error",
        }
    }
}

impl IntoResponse for SpError {
    fn into_response(self) -> Response {
        let status = match &self {
            SpError::Malformed(_)
            | SpError::SignatureInvalid
            | SpError::DestinationMismatch(_)
            | SpError::AudienceMismatch(_)
            | SpError::CorrelationMismatch(_)
            | SpError::UnknownIssuer(_)
            | SpError::Expired(_)
            | SpError::NotYetValid(_)
            | SpError::RemoteFailure(_) => StatusCode::BAD_REQUEST,
            SpError::UnknownAlias(_) => StatusCode::NOT_FOUND,
            SpError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            SpError::Configuration(detail) => {
                tracing::error!(detail = %detail, "SP configuration error");
                "An internal configuration error occurred".to_string()
            }
            // Every other variant carries only values the peer already sent.
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
