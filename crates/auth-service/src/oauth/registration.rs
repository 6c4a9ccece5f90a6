//! RFC 7591: OAuth 2.0 Dynamic Client Registration
//!
//! Allows clients (like Claude iOS) to register themselves automatically
//! without manual configuration.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use oauth_core::{ClientMetadata, OAuthError};

use super::ErrorResponse;
use crate::app::AppState;

/// Handler for `POST /register`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ClientMetadata>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            tracing::warn!("Rejected malformed registration request: {}", rejection);
            return ErrorResponse(OAuthError::InvalidClientMetadata(rejection.body_text()))
                .into_response();
        }
    };

    tracing::info!(
        "Client registration request: name={:?}, redirect_uris={:?}",
        request.client_name,
        request.redirect_uris
    );

    match state.server.register(request) {
        Ok(info) => (StatusCode::CREATED, Json(info)).into_response(),
        Err(err) => {
            tracing::warn!("Rejected client registration: {}", err);
            ErrorResponse(err).into_response()
        }
    }
}
