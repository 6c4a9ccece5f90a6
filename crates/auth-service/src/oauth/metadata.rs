//! RFC 8414: OAuth 2.0 Authorization Server Metadata
//!
//! Provides the `/.well-known/oauth-authorization-server` endpoint that clients
//! use to discover OAuth endpoints and capabilities.

use std::sync::Arc;

use axum::{Json, extract::State};
use oauth_core::{AuthMethod, PkceMethod, SUPPORTED_RESPONSE_TYPES};
use serde::Serialize;

use crate::app::AppState;

/// OAuth 2.0 Authorization Server Metadata (RFC 8414)
#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    /// The authorization server's issuer identifier (URL)
    pub issuer: String,

    /// URL of the authorization endpoint
    pub authorization_endpoint: String,

    /// URL of the token endpoint
    pub token_endpoint: String,

    /// URL of the dynamic client registration endpoint
    pub registration_endpoint: String,

    /// URL of the userinfo endpoint
    pub userinfo_endpoint: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// JSON array of OAuth 2.0 response_type values supported
    pub response_types_supported: Vec<String>,

    /// JSON array of OAuth 2.0 grant_type values supported
    pub grant_types_supported: Vec<String>,

    /// JSON array of PKCE code challenge methods supported
    pub code_challenge_methods_supported: Vec<String>,

    /// JSON array of client authentication methods supported at token endpoint
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

/// Handler for `GET /.well-known/oauth-authorization-server`
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<AuthorizationServerMetadata> {
    let base_url = state.public_url.trim_end_matches('/');

    let metadata = AuthorizationServerMetadata {
        issuer: state.public_url.clone(),
        authorization_endpoint: format!("{}/authorize", base_url),
        token_endpoint: format!("{}/token", base_url),
        registration_endpoint: format!("{}/register", base_url),
        userinfo_endpoint: format!("{}/userinfo", base_url),
        scopes_supported: state.config.scopes_supported.clone(),
        response_types_supported: SUPPORTED_RESPONSE_TYPES
            .iter()
            .map(|s| s.to_string())
            .collect(),
        grant_types_supported: state
            .server
            .grant_types()
            .into_iter()
            .map(str::to_string)
            .collect(),
        code_challenge_methods_supported: PkceMethod::ALL
            .iter()
            .map(|m| m.as_str().to_string())
            .collect(),
        token_endpoint_auth_methods_supported: AuthMethod::ALL
            .iter()
            .map(|m| m.as_str().to_string())
            .collect(),
    };

    tracing::debug!("Serving authorization server metadata");
    Json(metadata)
}
