//! Error types for the authorization server.
//!
//! `OAuthError` carries the RFC 6749 / RFC 7591 error taxonomy. Every variant
//! is recoverable from the caller's point of view.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Unknown client_id")]
    UnknownClient,

    #[error("redirect_uri does not match a registered redirect URI")]
    RedirectMismatch,

    #[error("Unsupported response_type: {0}")]
    UnsupportedResponseType(String),

    #[error("Authorization grant was issued to another client")]
    ClientMismatch,

    #[error("{0}")]
    InvalidGrant(String),

    #[error("{0}")]
    InvalidClient(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    UnauthorizedClient(String),

    #[error("Unsupported grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("{0}")]
    InvalidClientMetadata(String),

    #[error("{0}")]
    InvalidRedirectUri(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// The `error` value sent on the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownClient | Self::InvalidClient(_) => "invalid_client",
            Self::RedirectMismatch | Self::ClientMismatch | Self::InvalidGrant(_) => {
                "invalid_grant"
            }
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::InvalidClientMetadata(_) => "invalid_client_metadata",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::ServerError(_) => "server_error",
        }
    }

    /// HTTP status the transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownClient | Self::InvalidClient(_) => 401,
            Self::ServerError(_) => 500,
            _ => 400,
        }
    }

    /// JSON error object (RFC 6749 Section 5.2).
    pub fn to_body(&self) -> OAuthErrorBody {
        let description = match self {
            // Internal details stay in the logs
            Self::ServerError(_) => "The server encountered an internal error".to_string(),
            other => other.to_string(),
        };
        OAuthErrorBody {
            error: self.error_code(),
            error_description: Some(description),
        }
    }
}

/// Error response body for the token and registration endpoints
#[derive(Debug, Clone, Serialize)]
pub struct OAuthErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Backend failures from an [`OAuthStore`](crate::store::OAuthStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        Self::ServerError(err.to_string())
    }
}

/// Reasons a bearer token fails validation.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is malformed: {0}")]
    Malformed(String),

    #[error("Token has been revoked")]
    Revoked,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            _ => Self::Malformed(err.to_string()),
        }
    }
}
