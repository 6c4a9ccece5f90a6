//! Bearer token validation for resource access

use crate::error::TokenError;
use crate::server::AuthorizationServer;
use crate::signing::AccessClaims;

impl AuthorizationServer {
    /// Verify a bearer token's signature and expiry, and that it has not been
    /// superseded by a refresh.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims = self.signer.verify(token, self.clock.now())?;

        if !self.store.is_access_active(&claims.jti)? {
            tracing::debug!("Access token {} has been rotated out", claims.jti);
            return Err(TokenError::Revoked);
        }

        tracing::debug!("Validated access token for client {}", claims.client_id);
        Ok(claims)
    }
}
