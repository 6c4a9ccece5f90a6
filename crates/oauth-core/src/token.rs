//! OAuth 2.1 Token Endpoint logic
//!
//! Handles:
//! - Authorization code exchange (with PKCE verification)
//! - Refresh token rotation
//!
//! Grant types are dispatched through [`GrantHandler`], so further grants
//! (client_credentials, device code) can be added with
//! [`AuthorizationServer::with_grant`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{SECRET_LENGTH, generate_random_string, hash_token, verify_pkce};
use crate::error::OAuthError;
use crate::model::{AccessRecord, OAuthClient, PkceMethod, RefreshGrant};
use crate::registry::ClientCredentials;
use crate::server::AuthorizationServer;
use crate::signing::AccessClaims;

pub const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Token request (form-encoded)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Grant type: "authorization_code" or "refresh_token"
    pub grant_type: String,

    /// Authorization code (for authorization_code grant)
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (for authorization_code grant, must match original)
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (for authorization_code grant)
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token (for refresh_token grant)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Client ID, when not sent via HTTP Basic
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post)
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Successful token response
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// One grant type accepted at the token endpoint.
///
/// The client has already been authenticated and is known to be registered
/// for this grant type when `handle` is called.
pub trait GrantHandler: Send + Sync {
    fn grant_type(&self) -> &'static str;

    fn handle(
        &self,
        server: &AuthorizationServer,
        client: &OAuthClient,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError>;
}

pub struct AuthorizationCodeGrant;

impl GrantHandler for AuthorizationCodeGrant {
    fn grant_type(&self) -> &'static str {
        AUTHORIZATION_CODE_GRANT
    }

    fn handle(
        &self,
        server: &AuthorizationServer,
        client: &OAuthClient,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let code = required(&request.code, "code")?;
        let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;
        server.redeem_code(client, code, redirect_uri, request.code_verifier.as_deref())
    }
}

pub struct RefreshTokenGrant;

impl GrantHandler for RefreshTokenGrant {
    fn grant_type(&self) -> &'static str {
        REFRESH_TOKEN_GRANT
    }

    fn handle(
        &self,
        server: &AuthorizationServer,
        client: &OAuthClient,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let refresh_token = required(&request.refresh_token, "refresh_token")?;
        server.rotate_refresh_token(client, refresh_token)
    }
}

fn require_grant(client: &OAuthClient, grant_type: &str) -> Result<(), OAuthError> {
    if client.allows_grant(grant_type) {
        return Ok(());
    }
    Err(OAuthError::UnauthorizedClient(format!(
        "Client is not registered for the {} grant",
        grant_type
    )))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request(format!("{} is required", name)))
}

impl AuthorizationServer {
    /// Token endpoint entry point: authenticate the client, then dispatch on
    /// `grant_type`.
    pub fn token(
        &self,
        request: &TokenRequest,
        credentials: &ClientCredentials,
    ) -> Result<TokenResponse, OAuthError> {
        let handler = self
            .grant_handler(&request.grant_type)
            .ok_or_else(|| OAuthError::UnsupportedGrantType(request.grant_type.clone()))?;

        let client = self.authenticate_client(credentials)?;
        require_grant(&client, handler.grant_type())?;

        handler.handle(self, &client, request)
    }

    /// Redeem an authorization code for an access token and refresh token.
    pub fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        client_secret: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate_client(&ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.map(str::to_string),
        })?;
        self.redeem_code(&client, code, redirect_uri, code_verifier)
    }

    /// Exchange a refresh token for a new access token and a new refresh
    /// token. The old pair stops working.
    pub fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate_client(&ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.map(str::to_string),
        })?;
        self.rotate_refresh_token(&client, refresh_token)
    }

    pub(crate) fn redeem_code(
        &self,
        client: &OAuthClient,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        require_grant(client, AUTHORIZATION_CODE_GRANT)?;

        let code_hash = hash_token(code);
        let now = self.clock.now();

        // Everything is checked before the code is consumed, so a failed
        // attempt leaves it redeemable
        let auth_code = self
            .store
            .get_code(&code_hash)?
            .filter(|c| !c.is_expired(now))
            .ok_or_else(|| OAuthError::invalid_grant("Authorization code is invalid or expired"))?;

        if auth_code.client_id != client.client_id {
            tracing::warn!(
                "Client {} presented a code issued to {}",
                client.client_id,
                auth_code.client_id
            );
            return Err(OAuthError::ClientMismatch);
        }

        if auth_code.redirect_uri != redirect_uri {
            return Err(OAuthError::RedirectMismatch);
        }

        match (&auth_code.code_challenge, code_verifier) {
            (Some(challenge), Some(verifier)) => {
                let method = auth_code.code_challenge_method.unwrap_or(PkceMethod::Plain);
                if !verify_pkce(method, challenge, verifier) {
                    tracing::warn!(
                        "PKCE verification failed for client {} - code_verifier does not match code_challenge",
                        client.client_id
                    );
                    return Err(OAuthError::invalid_grant(
                        "code_verifier does not match code_challenge",
                    ));
                }
            }
            (Some(_), None) => {
                return Err(OAuthError::invalid_grant("code_verifier is required"));
            }
            (None, Some(_)) => {
                return Err(OAuthError::invalid_grant(
                    "code_verifier sent but no code_challenge was issued",
                ));
            }
            (None, None) => {}
        }

        // Single-use: only one concurrent redemption gets the code
        let auth_code = self
            .store
            .take_code(&code_hash)?
            .ok_or_else(|| OAuthError::invalid_grant("Authorization code is invalid or expired"))?;

        let (response, access, refresh) = self.issue_tokens(
            &auth_code.client_id,
            &auth_code.user_id,
            auth_code.scope.clone(),
            now,
        )?;
        self.store.record_tokens(access, refresh)?;

        tracing::info!("Issued access token for client {}", client.client_id);
        Ok(response)
    }

    pub(crate) fn rotate_refresh_token(
        &self,
        client: &OAuthClient,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        require_grant(client, REFRESH_TOKEN_GRANT)?;

        let old_hash = hash_token(refresh_token);
        let now = self.clock.now();

        let grant = self
            .store
            .get_refresh(&old_hash)?
            .filter(|g| !g.is_expired(now))
            .ok_or_else(|| OAuthError::invalid_grant("Refresh token is invalid or expired"))?;

        if grant.client_id != client.client_id {
            tracing::warn!(
                "Client {} presented a refresh token issued to {}",
                client.client_id,
                grant.client_id
            );
            return Err(OAuthError::ClientMismatch);
        }

        let (response, access, refresh) =
            self.issue_tokens(&grant.client_id, &grant.user_id, grant.scope.clone(), now)?;

        // A concurrent refresh of the same token may have won; then the
        // tokens minted above are never recorded and never validate
        if self.store.rotate_refresh(&old_hash, access, refresh)?.is_none() {
            return Err(OAuthError::invalid_grant(
                "Refresh token is invalid or expired",
            ));
        }

        tracing::info!("Refreshed access token for client {}", client.client_id);
        Ok(response)
    }

    /// Mint a signed access token and an opaque refresh token. Nothing is
    /// stored here.
    fn issue_tokens(
        &self,
        client_id: &str,
        user_id: &str,
        scope: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(TokenResponse, AccessRecord, RefreshGrant), OAuthError> {
        let access_expires_at = now + self.settings.access_token_lifetime;
        let claims = AccessClaims {
            iss: self.signer.issuer().to_string(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            exp: access_expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: scope.clone(),
            client_id: client_id.to_string(),
        };
        let access_token = self.signer.sign(&claims)?;

        let refresh_token = generate_random_string(SECRET_LENGTH);

        let access = AccessRecord {
            jti: claims.jti,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            expires_at: access_expires_at,
        };
        let refresh = RefreshGrant {
            token_hash: hash_token(&refresh_token),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.clone(),
            access_jti: access.jti.clone(),
            expires_at: now + self.settings.refresh_token_lifetime,
            created_at: now,
        };

        let response = TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_lifetime.num_seconds().max(0) as u64,
            refresh_token,
            scope,
        };

        Ok((response, access, refresh))
    }
}
