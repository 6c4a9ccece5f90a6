//! Userinfo endpoint: who a bearer token belongs to

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::app::AppState;
use crate::validation::{bearer_token, unauthorized};

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub client_id: String,
    pub exp: i64,
}

/// Handler for `GET /userinfo`
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(reason) => return unauthorized("Bearer", reason),
    };

    match state.server.validate(token) {
        Ok(claims) => Json(UserInfo {
            sub: claims.sub,
            scope: claims.scope,
            client_id: claims.client_id,
            exp: claims.exp,
        })
        .into_response(),
        Err(err) => {
            tracing::debug!("Userinfo rejected token: {}", err);
            unauthorized("Bearer error=\"invalid_token\"", "Invalid or expired token")
        }
    }
}
