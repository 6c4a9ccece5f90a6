//! Access token signing and verification (HS256 JWT)
//!
//! [`TokenSigner::verify`] has no side effects; any resource server sharing
//! the signing key can call it directly.

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{OAuthError, TokenError};

/// Claims carried by every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer (the server's public URL)
    pub iss: String,
    /// Subject (user_id)
    pub sub: String,
    /// Audience (client_id)
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    /// Unique token id, used to retire the token on refresh rotation
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub client_id: String,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Signing key must be at least {min} bytes, got {len}")]
    TooShort { min: usize, len: usize },
}

/// HMAC secret used to sign access tokens
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub const MIN_LEN: usize = 32;

    /// Random 256-bit key. Tokens signed with it do not survive a restart.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::MIN_LEN];
        rand::rng().fill(&mut bytes);
        Self(bytes.to_vec())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyError> {
        if bytes.len() < Self::MIN_LEN {
            return Err(KeyError::TooShort {
                min: Self::MIN_LEN,
                len: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

pub struct TokenSigner {
    issuer: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    pub fn new(issuer: impl Into<String>, key: &SigningKey) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `verify`
        validation.validate_exp = false;
        // Audience is the client; any client's token is acceptable here
        validation.validate_aud = false;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);

        Self {
            issuer,
            encoding: EncodingKey::from_secret(&key.0),
            decoding: DecodingKey::from_secret(&key.0),
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn sign(&self, claims: &AccessClaims) -> Result<String, OAuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            tracing::error!("Failed to sign access token: {}", e);
            OAuthError::ServerError("failed to sign access token".to_string())
        })
    }

    /// Check signature, issuer and expiry at `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)?;
        if data.claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}
