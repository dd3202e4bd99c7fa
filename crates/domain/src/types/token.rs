//! Token value object handed to callers

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderId;

/// A usable credential for one provider.
///
/// `expires_at == None` marks a non-expiring static key. Instances are
/// immutable; every successful read or refresh produces a new one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub provider: ProviderId,
    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<BTreeMap<String, String>>,
}

impl TokenInfo {
    /// A non-expiring static key.
    #[must_use]
    pub fn static_key(provider: ProviderId, token: impl Into<String>) -> Self {
        Self { token: token.into(), expires_at: None, provider, base_url: None, extra_headers: None }
    }

    /// An expiring token.
    #[must_use]
    pub fn expiring(provider: ProviderId, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(expires_at),
            provider,
            base_url: None,
            extra_headers: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.get_or_insert_with(BTreeMap::new).insert(name.into(), value.into());
        self
    }

    /// Whether this is a static key that never needs refreshing.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.expires_at.is_none()
    }

    /// True when the token expires within `buffer` of `now` (or already has).
    ///
    /// Static keys never fall inside the window.
    #[must_use]
    pub fn expires_within(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::from_std(buffer).unwrap_or(chrono::Duration::MAX);
                expires_at.signed_duration_since(now) <= buffer
            }
            None => false,
        }
    }

    /// True when the token has an expiry that is not in the future.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("extra_headers", &self.extra_headers.as_ref().map(BTreeMap::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for types::token.
    use super::*;

    /// Validates the expiry buffer boundary: 4 minutes out is inside a
    /// 5 minute buffer, 10 minutes out is not.
    #[test]
    fn test_expires_within_buffer() {
        let now = Utc::now();
        let buffer = Duration::from_secs(300);

        let soon = TokenInfo::expiring(ProviderId::OpenAiCodex, "t", now + chrono::Duration::minutes(4));
        let later =
            TokenInfo::expiring(ProviderId::OpenAiCodex, "t", now + chrono::Duration::minutes(10));

        assert!(soon.expires_within(buffer, now));
        assert!(!later.expires_within(buffer, now));
    }

    /// Validates that static keys never need refresh and never expire.
    #[test]
    fn test_static_key_never_expires() {
        let key = TokenInfo::static_key(ProviderId::Anthropic, "sk-live-xxxx");
        assert!(key.is_static());
        assert!(!key.expires_within(Duration::from_secs(u64::MAX / 4), Utc::now()));
        assert!(!key.is_expired(Utc::now()));
    }

    /// Validates that Debug output never contains the raw token.
    #[test]
    fn test_debug_redacts_token() {
        let info = TokenInfo::static_key(ProviderId::OpenAi, "sk-super-secret")
            .with_header("x-test", "1");
        let rendered = format!("{info:?}");
        assert!(!rendered.contains("sk-super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    /// Validates camelCase wire names expected by the UI bridge.
    #[test]
    fn test_serialized_field_names() {
        let info = TokenInfo::static_key(ProviderId::OpenAi, "k").with_base_url("https://x");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["baseURL"], "https://x");
        assert!(json.get("expiresAt").is_none());
    }
}
