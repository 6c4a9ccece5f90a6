//! The authorization server: shared state for every protocol operation.
//!
//! Operations are split by concern:
//! - [`registry`](crate::registry): `register`, `lookup`
//! - [`authorize`](crate::authorize): `authorize`
//! - [`token`](crate::token): `token`, `exchange_code`, `refresh`
//! - [`validate`](crate::validate): `validate`

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;

use crate::clock::{Clock, SystemClock};
use crate::signing::{SigningKey, TokenSigner};
use crate::store::{MemoryStore, OAuthStore};
use crate::token::{AuthorizationCodeGrant, GrantHandler, RefreshTokenGrant};

/// Protocol settings
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Issuer identifier, also the `iss` claim of access tokens
    pub issuer: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub code_lifetime: Duration,
    /// If set, registration only accepts redirect URIs from this list
    pub allowed_redirect_uris: Option<HashSet<String>>,
}

impl OAuthSettings {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            access_token_lifetime: Duration::hours(1),
            refresh_token_lifetime: Duration::days(30),
            code_lifetime: Duration::minutes(10),
            allowed_redirect_uris: None,
        }
    }
}

pub struct AuthorizationServer {
    pub(crate) settings: OAuthSettings,
    pub(crate) store: Arc<dyn OAuthStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) signer: TokenSigner,
    grants: Vec<Box<dyn GrantHandler>>,
}

impl AuthorizationServer {
    /// In-memory store, wall clock, and the authorization_code and
    /// refresh_token grants.
    pub fn new(settings: OAuthSettings, key: &SigningKey) -> Self {
        let signer = TokenSigner::new(settings.issuer.clone(), key);
        Self {
            settings,
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(SystemClock),
            signer,
            grants: vec![
                Box::new(AuthorizationCodeGrant),
                Box::new(RefreshTokenGrant),
            ],
        }
    }

    pub fn with_store(mut self, store: Arc<dyn OAuthStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Add (or replace) the handler for a grant type
    pub fn with_grant(mut self, handler: Box<dyn GrantHandler>) -> Self {
        self.grants.retain(|g| g.grant_type() != handler.grant_type());
        self.grants.push(handler);
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// The signer, for resource servers that verify tokens themselves
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn grant_types(&self) -> Vec<&'static str> {
        self.grants.iter().map(|g| g.grant_type()).collect()
    }

    pub(crate) fn grant_handler(&self, grant_type: &str) -> Option<&dyn GrantHandler> {
        self.grants
            .iter()
            .find(|g| g.grant_type() == grant_type)
            .map(|g| g.as_ref())
    }

    /// Drop expired codes and tokens from the store
    pub fn purge_expired(&self) -> Result<usize, crate::error::StoreError> {
        self.store.purge_expired(self.clock.now())
    }
}
