//! Persisted credential shapes
//!
//! [`CredentialPayload`] is the flat plaintext JSON object that is encrypted
//! and written as a whole per credential domain. [`StoredCredentials`] is the
//! typed OAuth view over it.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Plaintext of one encrypted credential file.
///
/// All fields are optional so an empty object is a valid "no credential"
/// payload. Timestamps are epoch milliseconds.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl CredentialPayload {
    /// Payload holding only a static API key.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self { api_key: Some(api_key.into()), ..Self::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Typed OAuth credentials, if the payload holds a complete set.
    #[must_use]
    pub fn stored_credentials(&self) -> Option<StoredCredentials> {
        StoredCredentials::try_from(self).ok()
    }
}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPayload")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("connected_at", &self.connected_at)
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .finish()
    }
}

/// OAuth credentials created by a successful code exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
    pub account_id: Option<String>,
    pub email: Option<String>,
}

impl StoredCredentials {
    /// Seconds of lifetime left at `now` (negative once expired).
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("connected_at", &self.connected_at)
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .finish()
    }
}

/// Missing field when reading OAuth credentials from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteCredentials(pub &'static str);

impl fmt::Display for IncompleteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "credential payload missing {}", self.0)
    }
}

impl std::error::Error for IncompleteCredentials {}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

impl TryFrom<&CredentialPayload> for StoredCredentials {
    type Error = IncompleteCredentials;

    fn try_from(payload: &CredentialPayload) -> Result<Self, Self::Error> {
        let access_token =
            payload.access_token.clone().ok_or(IncompleteCredentials("access_token"))?;
        let refresh_token =
            payload.refresh_token.clone().ok_or(IncompleteCredentials("refresh_token"))?;
        let expires_at = payload
            .expires_at
            .and_then(millis_to_datetime)
            .ok_or(IncompleteCredentials("expires_at"))?;
        let connected_at =
            payload.connected_at.and_then(millis_to_datetime).unwrap_or(expires_at);

        Ok(Self {
            access_token,
            refresh_token,
            id_token: payload.id_token.clone(),
            expires_at,
            connected_at,
            account_id: payload.account_id.clone(),
            email: payload.email.clone(),
        })
    }
}

impl From<&StoredCredentials> for CredentialPayload {
    fn from(credentials: &StoredCredentials) -> Self {
        Self {
            api_key: None,
            access_token: Some(credentials.access_token.clone()),
            refresh_token: Some(credentials.refresh_token.clone()),
            id_token: credentials.id_token.clone(),
            expires_at: Some(credentials.expires_at.timestamp_millis()),
            connected_at: Some(credentials.connected_at.timestamp_millis()),
            account_id: credentials.account_id.clone(),
            email: credentials.email.clone(),
        }
    }
}
