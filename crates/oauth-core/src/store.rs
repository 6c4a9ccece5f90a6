//! Storage for OAuth clients, authorization codes and tokens
//!
//! Protocol logic only talks to [`OAuthStore`]. Every method is a single atomic
//! step, so a durable backend can implement it with conditional writes and
//! keep the exactly-once guarantees for codes and refresh tokens.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{AccessRecord, AuthorizationCode, OAuthClient, RefreshGrant};

pub type Result<T> = std::result::Result<T, StoreError>;

pub trait OAuthStore: Send + Sync {
    // --- Clients ---

    fn put_client(&self, client: OAuthClient) -> Result<()>;

    fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>>;

    // --- Authorization codes ---

    fn put_code(&self, code: AuthorizationCode) -> Result<()>;

    /// Read a code without consuming it
    fn get_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>>;

    /// Remove and return a code. Of any number of concurrent callers, at most
    /// one receives `Some`.
    fn take_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>>;

    // --- Tokens ---

    /// Record a freshly issued access token together with its refresh grant
    fn record_tokens(&self, access: AccessRecord, refresh: RefreshGrant) -> Result<()>;

    fn get_refresh(&self, token_hash: &str) -> Result<Option<RefreshGrant>>;

    /// Replace the refresh grant `old_hash` (and the access token it points
    /// at) with a new pair in one step. Returns the retired grant, or `None`
    /// if it was already gone, in which case nothing is written.
    fn rotate_refresh(
        &self,
        old_hash: &str,
        access: AccessRecord,
        refresh: RefreshGrant,
    ) -> Result<Option<RefreshGrant>>;

    fn is_access_active(&self, jti: &str) -> Result<bool>;

    /// Drop expired codes, access records and refresh grants. Returns how
    /// many entries were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[derive(Debug, Default)]
struct TokenState {
    /// jti -> access record
    access: HashMap<String, AccessRecord>,
    /// refresh token hash -> grant
    refresh: HashMap<String, RefreshGrant>,
}

/// Process-local store. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: RwLock<HashMap<String, OAuthClient>>,
    codes: Mutex<HashMap<String, AuthorizationCode>>,
    /// Access records and refresh grants share one lock so rotation is atomic
    tokens: Mutex<TokenState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OAuthStore for MemoryStore {
    fn put_client(&self, client: OAuthClient) -> Result<()> {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| StoreError::Poisoned("clients"))?;
        clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let clients = self
            .clients
            .read()
            .map_err(|_| StoreError::Poisoned("clients"))?;
        Ok(clients.get(client_id).cloned())
    }

    fn put_code(&self, code: AuthorizationCode) -> Result<()> {
        let mut codes = self.codes.lock().map_err(|_| StoreError::Poisoned("codes"))?;
        codes.insert(code.code_hash.clone(), code);
        Ok(())
    }

    fn get_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>> {
        let codes = self.codes.lock().map_err(|_| StoreError::Poisoned("codes"))?;
        Ok(codes.get(code_hash).cloned())
    }

    fn take_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>> {
        let mut codes = self.codes.lock().map_err(|_| StoreError::Poisoned("codes"))?;
        Ok(codes.remove(code_hash))
    }

    fn record_tokens(&self, access: AccessRecord, refresh: RefreshGrant) -> Result<()> {
        let mut tokens = self.tokens.lock().map_err(|_| StoreError::Poisoned("tokens"))?;
        tokens.access.insert(access.jti.clone(), access);
        tokens.refresh.insert(refresh.token_hash.clone(), refresh);
        Ok(())
    }

    fn get_refresh(&self, token_hash: &str) -> Result<Option<RefreshGrant>> {
        let tokens = self.tokens.lock().map_err(|_| StoreError::Poisoned("tokens"))?;
        Ok(tokens.refresh.get(token_hash).cloned())
    }

    fn rotate_refresh(
        &self,
        old_hash: &str,
        access: AccessRecord,
        refresh: RefreshGrant,
    ) -> Result<Option<RefreshGrant>> {
        let mut tokens = self.tokens.lock().map_err(|_| StoreError::Poisoned("tokens"))?;
        let Some(old) = tokens.refresh.remove(old_hash) else {
            return Ok(None);
        };
        tokens.access.remove(&old.access_jti);
        tokens.access.insert(access.jti.clone(), access);
        tokens.refresh.insert(refresh.token_hash.clone(), refresh);
        Ok(Some(old))
    }

    fn is_access_active(&self, jti: &str) -> Result<bool> {
        let tokens = self.tokens.lock().map_err(|_| StoreError::Poisoned("tokens"))?;
        Ok(tokens.access.contains_key(jti))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;

        {
            let mut codes = self.codes.lock().map_err(|_| StoreError::Poisoned("codes"))?;
            let before = codes.len();
            codes.retain(|_, c| !c.is_expired(now));
            removed += before - codes.len();
        }

        {
            let mut tokens = self.tokens.lock().map_err(|_| StoreError::Poisoned("tokens"))?;
            let before = tokens.access.len() + tokens.refresh.len();
            tokens.access.retain(|_, t| t.expires_at > now);
            tokens.refresh.retain(|_, t| !t.is_expired(now));
            removed += before - (tokens.access.len() + tokens.refresh.len());
        }

        if removed > 0 {
            tracing::info!("Cleaned up {} expired codes and tokens", removed);
        }
        Ok(removed)
    }
}
