//! Configuration loading and management

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use oauth_core::{OAuthSettings, SigningKey};
use serde::{Deserialize, Serialize};

/// Main configuration for the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Token configuration
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Hex-encoded HS256 secret for access tokens (32+ bytes)
    /// If not set, a random key is generated at startup (tokens won't survive restarts)
    #[serde(default)]
    pub signing_key: Option<String>,

    /// If set, clients may only register redirect URIs from this list
    #[serde(default)]
    pub allowed_redirect_uris: Option<HashSet<String>>,

    /// User identity bound to auto-approved authorizations
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Scopes advertised in the discovery document
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds (default: 1 hour)
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,

    /// Refresh token lifetime in seconds (default: 30 days)
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime_secs: u64,

    /// Authorization code lifetime in seconds (default: 10 minutes)
    #[serde(default = "default_code_lifetime")]
    pub authorization_code_lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_token_lifetime(),
            refresh_token_lifetime_secs: default_refresh_token_lifetime(),
            authorization_code_lifetime_secs: default_code_lifetime(),
        }
    }
}

fn default_subject() -> String {
    "owner".to_string()
}

fn default_access_token_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_refresh_token_lifetime() -> u64 {
    30 * 24 * 3600 // 30 days
}

fn default_code_lifetime() -> u64 {
    600 // 10 minutes
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tokens: TokenConfig::default(),
            signing_key: None,
            allowed_redirect_uris: None,
            subject: default_subject(),
            scopes_supported: None,
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            let config = Config::default();

            // Create config directory if it doesn't exist
            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    /// The access token signing key. A configured key that cannot be decoded
    /// is an error rather than a silent fallback.
    pub fn signing_key(&self) -> Result<SigningKey> {
        match &self.signing_key {
            Some(encoded) => {
                let bytes = hex::decode(encoded.trim())
                    .context("signing_key is not valid hex")?;
                Ok(SigningKey::from_bytes(bytes)?)
            }
            None => {
                tracing::warn!(
                    "No signing_key configured, generated a random one (tokens won't survive restarts)"
                );
                Ok(SigningKey::generate())
            }
        }
    }

    pub fn oauth_settings(&self, issuer: &str) -> OAuthSettings {
        let mut settings = OAuthSettings::new(issuer);
        settings.access_token_lifetime = seconds(self.tokens.access_token_lifetime_secs);
        settings.refresh_token_lifetime = seconds(self.tokens.refresh_token_lifetime_secs);
        settings.code_lifetime = seconds(self.tokens.authorization_code_lifetime_secs);
        settings.allowed_redirect_uris = self.allowed_redirect_uris.clone();
        settings
    }
}

/// Lifetimes are capped at ten years so expiry arithmetic cannot overflow
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64)
}
