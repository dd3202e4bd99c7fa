//! OAuth 2.0 wire types
//!
//! Token endpoint responses (RFC 6749 §5), error bodies, loopback callback
//! parameters, and the identity claims read from an OpenID Connect ID token.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tabula_domain::StoredCredentials;

/// Namespaced claim carrying ChatGPT account metadata.
const OPENAI_AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// Lifetime assumed when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Token endpoint success response
#[derive(Deserialize)]
pub struct TokenResponse {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Present when the server issues or rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OpenID Connect ID token carrying account claims.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

impl TokenResponse {
    /// Absolute expiry computed from `expires_in` at `now`.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.expires_in.filter(|s| *s > 0).unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        now + Duration::seconds(secs)
    }

    /// Credentials created by a successful code exchange.
    ///
    /// Returns `None` when the server did not issue a refresh token, since
    /// such a grant cannot be kept alive silently.
    #[must_use]
    pub fn into_credentials(self, now: DateTime<Utc>) -> Option<StoredCredentials> {
        let expires_at = self.expires_at(now);
        let claims = self.id_token.as_deref().and_then(IdTokenClaims::parse).unwrap_or_default();
        Some(StoredCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token?,
            id_token: self.id_token,
            expires_at,
            connected_at: now,
            account_id: claims.account_id,
            email: claims.email,
        })
    }

    /// Apply a refresh grant to existing credentials.
    ///
    /// Access token and expiry are always replaced. The refresh token, ID
    /// token and account metadata are replaced only when reissued.
    pub fn apply_refresh(self, credentials: &mut StoredCredentials, now: DateTime<Utc>) {
        credentials.expires_at = self.expires_at(now);
        credentials.access_token = self.access_token;
        if let Some(refresh_token) = self.refresh_token.filter(|t| !t.is_empty()) {
            credentials.refresh_token = refresh_token;
        }
        if let Some(id_token) = self.id_token {
            if let Some(claims) = IdTokenClaims::parse(&id_token) {
                credentials.account_id = claims.account_id.or(credentials.account_id.take());
                credentials.email = claims.email.or(credentials.email.take());
            }
            credentials.id_token = Some(id_token);
        }
    }
}

/// Token endpoint error body (RFC 6749 §5.2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    /// Error code, e.g. `invalid_grant`.
    pub error: String,
    /// Human-readable detail.
    #[serde(default)]
    pub error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => f.write_str(&self.error),
        }
    }
}

/// Query parameters of a loopback redirect
#[derive(Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed anti-forgery state.
    pub state: Option<String>,
    /// Error code when the user or server refused.
    pub error: Option<String>,
    /// Detail for `error`.
    pub error_description: Option<String>,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

/// Identity claims read from an ID token.
///
/// The signature is not verified: the token came straight from the token
/// endpoint over TLS and is only used for display and account routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTokenClaims {
    /// Signed-in user's email.
    pub email: Option<String>,
    /// ChatGPT account id used for request routing.
    pub account_id: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a JWT.
    #[must_use]
    pub fn parse(id_token: &str) -> Option<Self> {
        let payload = id_token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok().or_else(|| {
            let padded = match payload.len() % 4 {
                2 => format!("{payload}=="),
                3 => format!("{payload}="),
                _ => payload.to_string(),
            };
            STANDARD.decode(padded).ok()
        })?;
        let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

        Some(Self {
            email: claims["email"].as_str().map(str::to_string),
            account_id: claims[OPENAI_AUTH_CLAIM]["chatgpt_account_id"]
                .as_str()
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    fn fake_id_token(email: &str, account_id: &str) -> String {
        let claims = serde_json::json!({
            "email": email,
            OPENAI_AUTH_CLAIM: { "chatgpt_account_id": account_id },
        });
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}"),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn response(refresh: Option<&str>, id_token: Option<String>) -> TokenResponse {
        TokenResponse {
            access_token: "new-access".to_string(),
            refresh_token: refresh.map(str::to_string),
            id_token,
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3600),
            scope: None,
        }
    }

    /// Validates ID token claim extraction for email and account id.
    #[test]
    fn test_parse_id_token_claims() {
        let claims = IdTokenClaims::parse(&fake_id_token("a@example.com", "acct_9")).unwrap();
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
        assert_eq!(claims.account_id.as_deref(), Some("acct_9"));
        assert!(IdTokenClaims::parse("not-a-jwt").is_none());
    }

    /// Validates a code exchange response becomes stored credentials.
    #[test]
    fn test_into_credentials() {
        let now = Utc::now();
        let credentials = response(Some("refresh"), Some(fake_id_token("a@example.com", "acct")))
            .into_credentials(now)
            .unwrap();
        assert_eq!(credentials.expires_at, now + Duration::seconds(3600));
        assert_eq!(credentials.connected_at, now);
        assert_eq!(credentials.account_id.as_deref(), Some("acct"));

        assert!(response(None, None).into_credentials(now).is_none());
    }

    /// Validates refresh keeps the old refresh token and metadata unless
    /// reissued.
    #[test]
    fn test_apply_refresh_preserves_unissued_fields() {
        let now = Utc::now();
        let mut credentials = response(Some("old-refresh"), Some(fake_id_token("a@x.io", "acct")))
            .into_credentials(now)
            .unwrap();

        response(None, None).apply_refresh(&mut credentials, now);
        assert_eq!(credentials.access_token, "new-access");
        assert_eq!(credentials.refresh_token, "old-refresh");
        assert_eq!(credentials.email.as_deref(), Some("a@x.io"));

        response(Some("rotated"), None).apply_refresh(&mut credentials, now);
        assert_eq!(credentials.refresh_token, "rotated");
    }

    /// Validates the default lifetime when `expires_in` is absent.
    #[test]
    fn test_missing_expires_in() {
        let now = Utc::now();
        let mut r = response(Some("r"), None);
        r.expires_in = None;
        assert_eq!(r.expires_at(now), now + Duration::seconds(3600));
    }
}
