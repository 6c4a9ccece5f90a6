//! OAuth 2.1 Authorization Endpoint
//!
//! Handles authorization requests with PKCE support.
//! Requests are auto-approved for the configured subject; there is no login
//! or consent page.

use std::sync::Arc;

use axum::{
    Form,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use oauth_core::{AuthorizeError, AuthorizeRequest, OAuthError};

use crate::app::AppState;

/// Handler for `GET /authorize`
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    match params {
        Ok(Query(params)) => authorize(&state, &params),
        Err(rejection) => direct_error(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

/// Handler for `POST /authorize` (form-encoded parameters)
pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Form<AuthorizeRequest>, FormRejection>,
) -> Response {
    match params {
        Ok(Form(params)) => authorize(&state, &params),
        Err(rejection) => direct_error(StatusCode::BAD_REQUEST, &rejection.body_text()),
    }
}

fn authorize(state: &AppState, params: &AuthorizeRequest) -> Response {
    if let Err(e) = state.server.purge_expired() {
        tracing::warn!("Failed to purge expired grants: {}", e);
    }

    match state.server.authorize(params, &state.config.subject) {
        Ok(grant) => Redirect::to(&grant.redirect_url()).into_response(),
        Err(AuthorizeError::Direct(error)) => {
            tracing::warn!(
                "Rejected authorization request for client {}: {}",
                params.client_id,
                error
            );
            match error {
                OAuthError::ServerError(_) => direct_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The server encountered an internal error",
                ),
                OAuthError::UnknownClient => direct_error(
                    StatusCode::BAD_REQUEST,
                    "Unknown client_id. Please register first.",
                ),
                OAuthError::RedirectMismatch => direct_error(
                    StatusCode::BAD_REQUEST,
                    "redirect_uri does not match registered URIs for this client.",
                ),
                other => direct_error(StatusCode::BAD_REQUEST, &other.to_string()),
            }
        }
        Err(err) => {
            tracing::debug!(
                "Authorization request for client {} failed: {}",
                params.client_id,
                err
            );
            match err.redirect_url() {
                Some(url) => Redirect::to(&url).into_response(),
                None => direct_error(StatusCode::BAD_REQUEST, &err.to_string()),
            }
        }
    }
}

/// Error shown to the user agent when the redirect URI cannot be trusted
fn direct_error(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}
