//! RFC 7591: OAuth 2.0 Dynamic Client Registration
//!
//! Clients register themselves at runtime. Registration is not idempotent:
//! identical metadata always yields a new `client_id`.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::crypto::{SECRET_LENGTH, constant_time_eq, generate_random_string, hash_token};
use crate::error::OAuthError;
use crate::model::{AuthMethod, OAuthClient};
use crate::server::AuthorizationServer;
use crate::{SUPPORTED_GRANT_TYPES, SUPPORTED_RESPONSE_TYPES};

/// Client registration request (RFC 7591 Section 2)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMetadata {
    /// Human-readable name for this client (required)
    #[serde(default)]
    pub client_name: Option<String>,

    /// Array of redirect URIs for this client
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub grant_types: Option<Vec<String>>,

    #[serde(default)]
    pub response_types: Option<Vec<String>>,

    #[serde(default)]
    pub scope: Option<String>,

    /// "none" (default), "client_secret_basic" or "client_secret_post"
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
}

/// Client information response (RFC 7591 Section 3.2.1)
#[derive(Debug, Clone, Serialize)]
pub struct ClientInformation {
    pub client_id: String,

    /// Only issued to confidential clients, and only returned once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub client_id_issued_at: i64,

    /// 0 means the secret never expires
    pub client_secret_expires_at: i64,

    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    pub token_endpoint_auth_method: String,
}

/// Credentials presented at the token endpoint
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl AuthorizationServer {
    /// Register a new client.
    pub fn register(&self, metadata: ClientMetadata) -> Result<ClientInformation, OAuthError> {
        let client_name = metadata
            .client_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| OAuthError::InvalidClientMetadata("client_name is required".into()))?
            .to_string();

        self.check_redirect_uris(&metadata.redirect_uris)?;

        let auth_method = match metadata.token_endpoint_auth_method.as_deref() {
            None => AuthMethod::None,
            Some(value) => AuthMethod::parse(value).ok_or_else(|| {
                OAuthError::InvalidClientMetadata(format!(
                    "Unsupported token_endpoint_auth_method: {}",
                    value
                ))
            })?,
        };

        let grant_types = checked_subset(
            metadata.grant_types,
            SUPPORTED_GRANT_TYPES,
            "grant_type",
        )?;
        let response_types = checked_subset(
            metadata.response_types,
            SUPPORTED_RESPONSE_TYPES,
            "response_type",
        )?;

        let client_id = format!("client_{}", generate_random_string(24));
        let client_secret = auth_method
            .requires_secret()
            .then(|| generate_random_string(SECRET_LENGTH));
        let now = self.clock.now();

        let client = OAuthClient {
            client_id: client_id.clone(),
            client_name: client_name.clone(),
            client_secret_hash: client_secret.as_deref().map(hash_token),
            redirect_uris: metadata.redirect_uris.clone(),
            grant_types: grant_types.clone(),
            response_types: response_types.clone(),
            scope: metadata.scope.clone(),
            auth_method,
            created_at: now,
        };
        self.store.put_client(client)?;

        tracing::info!(
            "Registered new client: {} ({}, auth_method={})",
            client_id,
            client_name,
            auth_method.as_str()
        );

        Ok(ClientInformation {
            client_id,
            client_secret,
            client_id_issued_at: now.timestamp(),
            client_secret_expires_at: 0,
            client_name,
            redirect_uris: metadata.redirect_uris,
            grant_types,
            response_types,
            scope: metadata.scope,
            token_endpoint_auth_method: auth_method.as_str().to_string(),
        })
    }

    /// Get a registered client by ID
    pub fn lookup(&self, client_id: &str) -> Result<OAuthClient, OAuthError> {
        self.store
            .get_client(client_id)?
            .ok_or(OAuthError::UnknownClient)
    }

    /// Resolve and authenticate the client presenting a token request.
    pub(crate) fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, OAuthError> {
        let client = self
            .store
            .get_client(&credentials.client_id)?
            .ok_or_else(|| OAuthError::InvalidClient("Unknown client".into()))?;

        let Some(expected) = client.client_secret_hash.as_deref() else {
            return Ok(client);
        };

        match credentials.client_secret.as_deref() {
            Some(secret) if constant_time_eq(&hash_token(secret), expected) => Ok(client),
            Some(_) => {
                tracing::warn!("Client authentication failed for {}", client.client_id);
                Err(OAuthError::InvalidClient("Client authentication failed".into()))
            }
            None => {
                tracing::warn!("Confidential client {} sent no secret", client.client_id);
                Err(OAuthError::InvalidClient(
                    "Client authentication required".into(),
                ))
            }
        }
    }

    fn check_redirect_uris(&self, uris: &[String]) -> Result<(), OAuthError> {
        if uris.is_empty() {
            return Err(OAuthError::InvalidRedirectUri(
                "At least one redirect_uri is required".into(),
            ));
        }

        for uri in uris {
            // Url::parse only accepts absolute URLs
            let parsed = Url::parse(uri).map_err(|_| {
                OAuthError::InvalidRedirectUri(format!("Redirect URI is not absolute: {}", uri))
            })?;
            if parsed.fragment().is_some() {
                return Err(OAuthError::InvalidRedirectUri(format!(
                    "Redirect URI must not contain a fragment: {}",
                    uri
                )));
            }

            if let Some(allowed) = &self.settings.allowed_redirect_uris {
                if !allowed.contains(uri) {
                    tracing::warn!("Rejected registration with disallowed redirect URI: {}", uri);
                    return Err(OAuthError::InvalidRedirectUri(format!(
                        "Redirect URI not allowed: {}",
                        uri
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Default to everything supported; reject anything unknown.
fn checked_subset(
    requested: Option<Vec<String>>,
    supported: &[&str],
    what: &str,
) -> Result<Vec<String>, OAuthError> {
    let Some(requested) = requested else {
        return Ok(supported.iter().map(|s| s.to_string()).collect());
    };

    if requested.is_empty() {
        return Err(OAuthError::InvalidClientMetadata(format!(
            "At least one {} is required",
            what
        )));
    }
    if let Some(unknown) = requested.iter().find(|r| !supported.contains(&r.as_str())) {
        return Err(OAuthError::InvalidClientMetadata(format!(
            "Unsupported {}: {}",
            what, unknown
        )));
    }
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::OAuthSettings;
    use crate::signing::SigningKey;

    fn server() -> AuthorizationServer {
        AuthorizationServer::new(
            OAuthSettings::new("https://auth.example"),
            &SigningKey::generate(),
        )
    }

    fn metadata(name: &str, uris: &[&str]) -> ClientMetadata {
        ClientMetadata {
            client_name: Some(name.into()),
            redirect_uris: uris.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_public_client_gets_no_secret() {
        let server = server();
        let info = server.register(metadata("demo", &["https://x/cb"])).unwrap();

        assert!(info.client_id.starts_with("client_"));
        assert!(info.client_secret.is_none());
        assert_eq!(info.client_secret_expires_at, 0);
        assert_eq!(info.token_endpoint_auth_method, "none");
        assert_eq!(info.grant_types, vec!["authorization_code", "refresh_token"]);
        assert_eq!(info.response_types, vec!["code"]);

        let client = server.lookup(&info.client_id).unwrap();
        assert!(client.is_public());
        assert_eq!(client.client_name, "demo");
    }

    #[test]
    fn test_confidential_client_gets_secret() {
        let server = server();
        let mut request = metadata("backend", &["https://x/cb"]);
        request.token_endpoint_auth_method = Some("client_secret_basic".into());

        let info = server.register(request).unwrap();
        let secret = info.client_secret.expect("secret issued");
        assert_eq!(secret.len(), SECRET_LENGTH);

        let client = server.lookup(&info.client_id).unwrap();
        // Only the hash is kept
        assert_ne!(client.client_secret_hash.as_deref(), Some(secret.as_str()));

        let ok = server.authenticate_client(&ClientCredentials {
            client_id: info.client_id.clone(),
            client_secret: Some(secret),
        });
        assert!(ok.is_ok());

        let bad = server.authenticate_client(&ClientCredentials {
            client_id: info.client_id.clone(),
            client_secret: Some("wrong".into()),
        });
        assert!(matches!(bad, Err(OAuthError::InvalidClient(_))));

        let missing = server.authenticate_client(&ClientCredentials {
            client_id: info.client_id,
            client_secret: None,
        });
        assert!(matches!(missing, Err(OAuthError::InvalidClient(_))));
    }

    #[test]
    fn test_identical_metadata_yields_distinct_ids() {
        let server = server();
        let a = server.register(metadata("demo", &["https://x/cb"])).unwrap();
        let b = server.register(metadata("demo", &["https://x/cb"])).unwrap();
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_name_required() {
        let server = server();
        let err = server.register(metadata("  ", &["https://x/cb"])).unwrap_err();
        assert_eq!(err.error_code(), "invalid_client_metadata");

        let mut unnamed = metadata("x", &["https://x/cb"]);
        unnamed.client_name = None;
        assert!(matches!(
            server.register(unnamed),
            Err(OAuthError::InvalidClientMetadata(_))
        ));
    }

    #[test]
    fn test_redirect_uris_validated() {
        let server = server();
        let cases: [&[&str]; 3] = [&[], &["/relative/cb"], &["https://x/cb#frag"]];
        for uris in cases {
            let err = server.register(metadata("demo", uris)).unwrap_err();
            assert_eq!(err.error_code(), "invalid_redirect_uri", "uris: {:?}", uris);
        }
    }

    #[test]
    fn test_allowlist_enforced() {
        let mut settings = OAuthSettings::new("https://auth.example");
        settings.allowed_redirect_uris =
            Some(["https://claude.ai/api/mcp/auth_callback".to_string()].into());
        let server = AuthorizationServer::new(settings, &SigningKey::generate());

        assert!(
            server
                .register(metadata("claude", &["https://claude.ai/api/mcp/auth_callback"]))
                .is_ok()
        );
        let err = server.register(metadata("evil", &["https://evil/cb"])).unwrap_err();
        assert!(matches!(err, OAuthError::InvalidRedirectUri(_)));
    }

    #[test]
    fn test_unsupported_metadata_rejected() {
        let server = server();

        let mut request = metadata("demo", &["https://x/cb"]);
        request.grant_types = Some(vec!["implicit".into()]);
        assert!(matches!(
            server.register(request),
            Err(OAuthError::InvalidClientMetadata(_))
        ));

        let mut request = metadata("demo", &["https://x/cb"]);
        request.response_types = Some(vec!["token".into()]);
        assert!(matches!(
            server.register(request),
            Err(OAuthError::InvalidClientMetadata(_))
        ));

        let mut request = metadata("demo", &["https://x/cb"]);
        request.token_endpoint_auth_method = Some("private_key_jwt".into());
        assert!(matches!(
            server.register(request),
            Err(OAuthError::InvalidClientMetadata(_))
        ));
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(matches!(
            server().lookup("client_nope"),
            Err(OAuthError::UnknownClient)
        ));
    }
}
