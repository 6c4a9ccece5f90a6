//! OAuth 2.1 Token Endpoint
//!
//! Handles:
//! - Authorization code exchange (with PKCE verification)
//! - Refresh token grants
//!
//! Clients authenticate with HTTP Basic or with `client_id`/`client_secret`
//! form fields; public clients send `client_id` alone.

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oauth_core::{ClientCredentials, OAuthError, TokenRequest};

use super::ErrorResponse;
use crate::app::AppState;

/// Handler for `POST /token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Form(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            return ErrorResponse(OAuthError::invalid_request(rejection.body_text()))
                .into_response();
        }
    };

    let credentials = match client_credentials(&headers, &request) {
        Ok(credentials) => credentials,
        Err(err) => return ErrorResponse(err).into_response(),
    };

    match state.server.token(&request, &credentials) {
        Ok(tokens) => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
            Json(tokens),
        )
            .into_response(),
        Err(err) => {
            tracing::debug!(
                "Token request ({}) from client {} failed: {}",
                request.grant_type,
                credentials.client_id,
                err
            );
            ErrorResponse(err).into_response()
        }
    }
}

/// Pick the client credentials from HTTP Basic or the form body. Using both
/// at once is rejected (RFC 6749 Section 2.3).
fn client_credentials(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<ClientCredentials, OAuthError> {
    if let Some(basic) = basic_credentials(headers)? {
        if request.client_secret.is_some() {
            return Err(OAuthError::invalid_request(
                "Use only one client authentication method",
            ));
        }
        if request
            .client_id
            .as_deref()
            .is_some_and(|id| id != basic.client_id)
        {
            return Err(OAuthError::invalid_request(
                "client_id does not match HTTP Basic credentials",
            ));
        }
        return Ok(basic);
    }

    let client_id = request
        .client_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;

    Ok(ClientCredentials {
        client_id,
        client_secret: request.client_secret.clone(),
    })
}

fn basic_credentials(headers: &HeaderMap) -> Result<Option<ClientCredentials>, OAuthError> {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Basic "))
    else {
        return Ok(None);
    };

    let malformed = || OAuthError::InvalidClient("Malformed HTTP Basic credentials".into());

    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (client_id, client_secret) = decoded.split_once(':').ok_or_else(malformed)?;

    Ok(Some(ClientCredentials {
        client_id: client_id.to_string(),
        client_secret: Some(client_secret.to_string()).filter(|s| !s.is_empty()),
    }))
}
