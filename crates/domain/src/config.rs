//! Configuration management
//!
//! Everything here is static configuration, never user input. `Default`
//! carries the production values from [`crate::constants`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_BACKOFF_MS, CALLBACK_TIMEOUT_SECS, CODEX_ACCOUNT_HEADER, CODEX_AUTHORIZE_URL,
    CODEX_BASE_URL, CODEX_CLIENT_ID, CODEX_REDIRECT_URI, CODEX_REFRESH_INTERVAL_SECS,
    CODEX_SCOPES, CODEX_TOKEN_URL, CREDENTIAL_CACHE_TTL_MS, DEFAULT_CALLBACK_PATH,
    EXPIRY_BUFFER_SECS, FAILURE_PENALTY_MS, JITTER_RATIO, MAX_PENALIZED_FAILURES,
    MAX_REFRESH_ATTEMPTS,
};
use crate::errors::{Result, TabulaError};

/// Credential subsystem configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Application-private directory holding one encrypted file per provider.
    pub storage_dir: PathBuf,
    /// Read-cache lifetime of a decrypted payload.
    pub cache_ttl_ms: u64,
    pub refresh: RefreshPolicy,
    pub codex: OAuthProviderSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("credentials"),
            cache_ttl_ms: CREDENTIAL_CACHE_TTL_MS,
            refresh: RefreshPolicy::default(),
            codex: OAuthProviderSettings::default(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Reject values that would break the refresh or listener invariants.
    ///
    /// # Errors
    /// Returns `TabulaError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.refresh.validate()?;
        self.codex.validate()
    }
}

/// Retry, backoff and proactive-refresh tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshPolicy {
    /// Tokens expiring within this window are refreshed before being returned.
    pub expiry_buffer_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    /// Extra delay per consecutive exhausted sequence.
    pub failure_penalty_ms: u64,
    /// Cap on how many consecutive failures add a penalty.
    pub max_penalized_failures: u32,
    /// Jitter as a fraction of the delay it is applied to (0.05 = ±5%).
    pub jitter_ratio: f64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: EXPIRY_BUFFER_SECS,
            max_attempts: MAX_REFRESH_ATTEMPTS,
            base_backoff_ms: BASE_BACKOFF_MS,
            failure_penalty_ms: FAILURE_PENALTY_MS,
            max_penalized_failures: MAX_PENALIZED_FAILURES,
            jitter_ratio: JITTER_RATIO,
        }
    }
}

impl RefreshPolicy {
    #[must_use]
    pub const fn expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.expiry_buffer_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TabulaError::Config("refresh.max_attempts must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(TabulaError::Config(format!(
                "refresh.jitter_ratio must be in [0, 1), got {}",
                self.jitter_ratio
            )));
        }
        Ok(())
    }
}

/// Authorization Code + PKCE settings for a public OAuth client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthProviderSettings {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Loopback redirect; its port and path define the callback listener.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub extra_authorize_params: Vec<(String, String)>,
    /// Inference base URL attached to issued `TokenInfo`s.
    pub base_url: Option<String>,
    /// Header carrying the account id on issued `TokenInfo`s.
    pub account_header: Option<String>,
    /// Fixed proactive refresh cadence.
    pub refresh_interval_secs: u64,
    /// How long an interactive flow waits for the browser callback.
    pub callback_timeout_secs: u64,
}

impl Default for OAuthProviderSettings {
    fn default() -> Self {
        Self {
            client_id: CODEX_CLIENT_ID.to_string(),
            authorize_url: CODEX_AUTHORIZE_URL.to_string(),
            token_url: CODEX_TOKEN_URL.to_string(),
            redirect_uri: CODEX_REDIRECT_URI.to_string(),
            scopes: CODEX_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            extra_authorize_params: vec![
                ("id_token_add_organizations".to_string(), "true".to_string()),
                ("codex_cli_simplified_flow".to_string(), "true".to_string()),
            ],
            base_url: Some(CODEX_BASE_URL.to_string()),
            account_header: Some(CODEX_ACCOUNT_HEADER.to_string()),
            refresh_interval_secs: CODEX_REFRESH_INTERVAL_SECS,
            callback_timeout_secs: CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl OAuthProviderSettings {
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub const fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// Port of the loopback redirect URI (80 if none is given).
    #[must_use]
    pub fn callback_port(&self) -> u16 {
        self.redirect_parts().map_or(80, |(port, _)| port)
    }

    /// Path of the loopback redirect URI.
    #[must_use]
    pub fn callback_path(&self) -> String {
        self.redirect_parts()
            .map_or_else(|| DEFAULT_CALLBACK_PATH.to_string(), |(_, path)| path)
    }

    // Parses `http://host[:port]/path` without pulling a URL parser into the
    // domain crate.
    fn redirect_parts(&self) -> Option<(u16, String)> {
        let rest = self.redirect_uri.strip_prefix("http://")?;
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => (rest, "/".to_string()),
        };
        let path = path.split(['?', '#']).next().unwrap_or("/").to_string();
        let port = match authority.rsplit_once(':') {
            Some((_, port)) => port.parse().ok()?,
            None => 80,
        };
        Some((port, path))
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(TabulaError::Config("oauth client_id is empty".into()));
        }
        if self.redirect_parts().is_none() {
            return Err(TabulaError::Config(format!(
                "oauth redirect_uri must be a loopback http URL, got {}",
                self.redirect_uri
            )));
        }
        Ok(())
    }
}
