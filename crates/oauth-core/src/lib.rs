//! oauth-core: OAuth 2.1 authorization server core.
//!
//! This crate provides:
//! - RFC 7591 Dynamic Client Registration (`register`, `lookup`)
//! - Authorization code issuance with optional PKCE binding (`authorize`)
//! - Single-use code redemption and refresh token rotation (`token`)
//! - Bearer access token validation (`validate`)
//!
//! It has no transport of its own. `auth-service` serves it over HTTP, and any
//! resource server holding the signing key can verify tokens with
//! [`TokenSigner::verify`].

pub mod authorize;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod model;
pub mod registry;
pub mod server;
pub mod signing;
pub mod store;
pub mod token;
pub mod validate;

pub use authorize::{AuthorizationGrant, AuthorizeError, AuthorizeRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{OAuthError, OAuthErrorBody, StoreError, TokenError};
pub use model::{
    AccessRecord, AuthMethod, AuthorizationCode, OAuthClient, PkceMethod, RefreshGrant,
};
pub use registry::{ClientCredentials, ClientInformation, ClientMetadata};
pub use server::{AuthorizationServer, OAuthSettings};
pub use signing::{AccessClaims, KeyError, SigningKey, TokenSigner};
pub use store::{MemoryStore, OAuthStore};
pub use token::{
    AuthorizationCodeGrant, GrantHandler, RefreshTokenGrant, TokenRequest, TokenResponse,
};

/// Grant types this server can issue tokens for.
pub const SUPPORTED_GRANT_TYPES: &[&str] = &[
    token::AUTHORIZATION_CODE_GRANT,
    token::REFRESH_TOKEN_GRANT,
];

/// Response types accepted at the authorization endpoint.
pub const SUPPORTED_RESPONSE_TYPES: &[&str] = &["code"];
