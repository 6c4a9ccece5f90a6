//! Token validation endpoint for Caddy forward_auth
//!
//! This endpoint is called by Caddy before proxying requests to protected services.
//! It accepts a request only if it carries a live OAuth access token, and passes
//! the token's subject and scope on as `X-Auth-User` / `X-Auth-Scope`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::app::AppState;

/// Extract the token from an `Authorization: Bearer …` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or("Missing Authorization header")?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header")?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or("Invalid Authorization header format")?
        .trim();
    if token.is_empty() {
        return Err("Missing bearer token");
    }
    Ok(token)
}

pub fn unauthorized(challenge: &'static str, message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        message,
    )
        .into_response()
}

/// Validation endpoint for Caddy forward_auth
///
/// Returns 200 if the request is authenticated, 401 otherwise.
/// Caddy will proxy the request only if this returns 200.
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(reason) => {
            tracing::debug!("{}", reason);
            return unauthorized("Bearer", reason);
        }
    };

    match state.server.validate(token) {
        Ok(claims) => {
            tracing::debug!(
                "Request authenticated via OAuth token for client {}",
                claims.client_id
            );
            (
                StatusCode::OK,
                [
                    ("X-Auth-User", claims.sub),
                    ("X-Auth-Scope", claims.scope.unwrap_or_default()),
                ],
                "OK",
            )
                .into_response()
        }
        Err(err) => {
            tracing::debug!("Invalid or expired token: {}", err);
            unauthorized("Bearer error=\"invalid_token\"", "Invalid or expired token")
        }
    }
}
