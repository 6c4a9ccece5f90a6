//! OAuth 2.1 HTTP endpoints
//!
//! Implements:
//! - RFC 8414: OAuth 2.0 Authorization Server Metadata
//! - RFC 7591: OAuth 2.0 Dynamic Client Registration
//! - OAuth 2.1 Authorization Code flow with PKCE
//! - Userinfo for bearer tokens

pub mod authorize;
pub mod metadata;
pub mod registration;
pub mod token;
pub mod userinfo;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use oauth_core::OAuthError;

/// An [`OAuthError`] rendered as an RFC 6749 JSON error response
pub struct ErrorResponse(pub OAuthError);

impl From<OAuthError> for ErrorResponse {
    fn from(err: OAuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let err = self.0;
        if let OAuthError::ServerError(detail) = &err {
            tracing::error!("OAuth request failed: {}", detail);
        }

        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        let mut response = (
            status,
            [(header::CACHE_CONTROL, "no-store")],
            Json(err.to_body()),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"oauth\""),
            );
        }
        response
    }
}
