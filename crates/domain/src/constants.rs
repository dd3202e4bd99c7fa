//! Application constants
//!
//! Centralized location for the credential lifecycle constants. Every value
//! here is the production default for a field in [`crate::config`].

// Refresh policy
pub const EXPIRY_BUFFER_SECS: u64 = 5 * 60;
pub const MAX_REFRESH_ATTEMPTS: u32 = 3;
pub const BASE_BACKOFF_MS: u64 = 1000;
pub const FAILURE_PENALTY_MS: u64 = 1000;
pub const MAX_PENALIZED_FAILURES: u32 = 5;
pub const JITTER_RATIO: f64 = 0.05;

// Credential store
pub const CREDENTIAL_CACHE_TTL_MS: u64 = 5000;
pub const CREDENTIAL_FILE_EXTENSION: &str = "enc";
pub const CREDENTIALS_DIR_NAME: &str = "credentials";

// OpenAI Codex (Authorization Code + PKCE, public client)
pub const CODEX_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
pub const CODEX_AUTHORIZE_URL: &str = "https://auth.openai.com/oauth/authorize";
pub const CODEX_TOKEN_URL: &str = "https://auth.openai.com/oauth/token";
pub const CODEX_REDIRECT_URI: &str = "http://localhost:1455/auth/callback";
pub const CODEX_BASE_URL: &str = "https://chatgpt.com/backend-api/codex";
pub const CODEX_ACCOUNT_HEADER: &str = "chatgpt-account-id";
pub const CODEX_REFRESH_INTERVAL_SECS: u64 = 55 * 60;
pub const CODEX_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

// Interactive flow
pub const CALLBACK_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/callback";
