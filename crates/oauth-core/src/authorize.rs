//! OAuth 2.1 Authorization Endpoint logic
//!
//! Every valid request is auto-approved for the configured user; there is no
//! consent screen. Multi-tenant deployments need a consent step before the
//! code is issued.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use url::{Url, form_urlencoded};

use crate::crypto::{CODE_LENGTH, generate_random_string, hash_token};
use crate::error::OAuthError;
use crate::model::{AuthorizationCode, PkceMethod};
use crate::server::AuthorizationServer;
use crate::token::AUTHORIZATION_CODE_GRANT;

/// Authorization request parameters
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be "code"; a missing value is reported through the redirect
    #[serde(default)]
    pub response_type: Option<String>,

    pub client_id: String,

    /// Must exactly match a registered URI
    pub redirect_uri: String,

    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque to the server, passed back on the redirect
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub code_challenge: Option<String>,

    /// "S256" or "plain" (the default when a challenge is sent alone)
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// An issued authorization code and where to send it
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    pub code: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationGrant {
    /// `redirect_uri?code=…&state=…`
    pub fn redirect_url(&self) -> String {
        let mut pairs = vec![("code", self.code.as_str())];
        if let Some(state) = &self.state {
            pairs.push(("state", state));
        }
        with_query(&self.redirect_uri, &pairs)
    }
}

#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// The redirect URI cannot be trusted; answer the user agent directly
    #[error(transparent)]
    Direct(OAuthError),

    /// Report the error to the client through its redirect URI
    #[error("{error}")]
    Redirect {
        redirect_uri: String,
        state: Option<String>,
        error: OAuthError,
    },
}

impl AuthorizeError {
    pub fn error(&self) -> &OAuthError {
        match self {
            Self::Direct(error) | Self::Redirect { error, .. } => error,
        }
    }

    /// `redirect_uri?error=…&error_description=…&state=…` for redirectable errors
    pub fn redirect_url(&self) -> Option<String> {
        let Self::Redirect {
            redirect_uri,
            state,
            error,
        } = self
        else {
            return None;
        };

        let description = error.to_string();
        let mut pairs = vec![
            ("error", error.error_code()),
            ("error_description", description.as_str()),
        ];
        if let Some(state) = state {
            pairs.push(("state", state));
        }
        Some(with_query(redirect_uri, &pairs))
    }
}

impl AuthorizationServer {
    /// Validate an authorization request and issue a single-use code bound
    /// to `user_id`.
    pub fn authorize(
        &self,
        request: &AuthorizeRequest,
        user_id: &str,
    ) -> Result<AuthorizationGrant, AuthorizeError> {
        let client = self.lookup(&request.client_id).map_err(AuthorizeError::Direct)?;

        if !client.has_redirect_uri(&request.redirect_uri) {
            tracing::warn!(
                "Authorization request for client {} with unregistered redirect_uri",
                client.client_id
            );
            return Err(AuthorizeError::Direct(OAuthError::RedirectMismatch));
        }

        // From here on the redirect URI is trusted
        let redirect_error = |error: OAuthError| AuthorizeError::Redirect {
            redirect_uri: request.redirect_uri.clone(),
            state: request.state.clone(),
            error,
        };

        match request.response_type.as_deref() {
            Some("code") => {}
            None | Some("") => {
                return Err(redirect_error(OAuthError::invalid_request(
                    "response_type is required",
                )));
            }
            Some(other) => {
                return Err(redirect_error(OAuthError::UnsupportedResponseType(
                    other.to_string(),
                )));
            }
        }

        if !client.allows_grant(AUTHORIZATION_CODE_GRANT) {
            return Err(redirect_error(OAuthError::UnauthorizedClient(
                "Client is not registered for the authorization_code grant".into(),
            )));
        }

        let (code_challenge, code_challenge_method) =
            parse_pkce(request).map_err(redirect_error)?;

        let scope = request
            .scope
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| client.scope.clone());

        let code = generate_random_string(CODE_LENGTH);
        let now = self.clock.now();
        let expires_at = now + self.settings.code_lifetime;

        let auth_code = AuthorizationCode {
            code_hash: hash_token(&code),
            client_id: client.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope,
            user_id: user_id.to_string(),
            code_challenge,
            code_challenge_method,
            expires_at,
            created_at: now,
        };
        self.store
            .put_code(auth_code)
            .map_err(|e| redirect_error(e.into()))?;

        tracing::info!(
            "Issued authorization code for client {} (auto-approved, pkce={})",
            client.client_id,
            code_challenge_method.map_or("none", |m| m.as_str())
        );

        Ok(AuthorizationGrant {
            code,
            redirect_uri: request.redirect_uri.clone(),
            state: request.state.clone(),
            expires_at,
        })
    }
}

fn parse_pkce(
    request: &AuthorizeRequest,
) -> Result<(Option<String>, Option<PkceMethod>), OAuthError> {
    let challenge = request.code_challenge.as_deref().filter(|c| !c.is_empty());
    let method = request.code_challenge_method.as_deref();

    let Some(challenge) = challenge else {
        if method.is_some() {
            return Err(OAuthError::invalid_request(
                "code_challenge_method sent without code_challenge",
            ));
        }
        return Ok((None, None));
    };

    let method = match method {
        None => PkceMethod::Plain,
        Some(value) => PkceMethod::parse(value).ok_or_else(|| {
            OAuthError::invalid_request(format!("Unsupported code_challenge_method: {}", value))
        })?,
    };

    // RFC 7636 Section 4.1/4.2: 43-128 unreserved characters
    let well_formed = (43..=128).contains(&challenge.len())
        && challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'));
    if !well_formed {
        return Err(OAuthError::invalid_request(
            "code_challenge must be 43-128 unreserved characters",
        ));
    }

    Ok((Some(challenge.to_string()), Some(method)))
}

fn with_query(base: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in pairs {
                    query.append_pair(key, value);
                }
            }
            url.into()
        }
        Err(_) => {
            let mut query = form_urlencoded::Serializer::new(String::new());
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{}{}{}", base, separator, query.finish())
        }
    }
}
