//! Records kept by the authorization server: clients, codes and tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a client authenticates at the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Public client, no secret
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

impl AuthMethod {
    pub const ALL: [AuthMethod; 3] = [
        AuthMethod::None,
        AuthMethod::ClientSecretBasic,
        AuthMethod::ClientSecretPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }

    pub fn requires_secret(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// PKCE code challenge method (RFC 7636)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    pub const ALL: [PkceMethod; 2] = [PkceMethod::S256, PkceMethod::Plain];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

/// A registered OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_name: String,
    /// Hash of the client secret; `None` for public clients
    pub client_secret_hash: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: Option<String>,
    pub auth_method: AuthMethod,
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Exact, byte-for-byte match against the registered redirect URIs.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    pub fn is_public(&self) -> bool {
        self.client_secret_hash.is_none()
    }
}

/// A pending authorization code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code_hash: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub user_id: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<PkceMethod>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// An access token that is still honoured by the validator.
///
/// The token itself is a self-contained JWT; the record only exists so that
/// rotation can retire it before its `exp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub jti: String,
    pub client_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// A refresh token and the access token it currently points at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshGrant {
    pub token_hash: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: Option<String>,
    pub access_jti: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
