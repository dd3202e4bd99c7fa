//! Shared fixtures for tabula-common integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tabula_common::auth::{OAuthClient, OAuthFlowController};
use tabula_common::security::{CredentialStore, StaticKeyCipher};
use tabula_common::testing::{fake_id_token, free_port, MockBrowser};
use tabula_domain::{CredentialPayload, OAuthProviderSettings, ProviderId, StoredCredentials};
use tempfile::TempDir;
use wiremock::MockServer;

/// HTTP client that never routes loopback traffic through a proxy.
pub fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().expect("build http client")
}

/// Settings pointing the token endpoint at `server` and the redirect at a
/// free loopback port.
pub fn settings_for(server: &MockServer) -> OAuthProviderSettings {
    OAuthProviderSettings {
        token_url: format!("{}/oauth/token", server.uri()),
        redirect_uri: format!("http://localhost:{}/auth/callback", free_port()),
        ..OAuthProviderSettings::default()
    }
}

pub fn store_in(dir: &TempDir, name: &str) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(
        dir.path().join(name),
        Arc::new(StaticKeyCipher::random()),
        Duration::from_secs(5),
    ))
}

pub struct FlowFixture {
    pub controller: Arc<OAuthFlowController>,
    pub browser: Arc<MockBrowser>,
    pub store: Arc<CredentialStore>,
    pub settings: OAuthProviderSettings,
    pub dir: TempDir,
}

impl FlowFixture {
    pub fn new(settings: OAuthProviderSettings) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir, "openai-codex.enc");
        let browser = Arc::new(MockBrowser::new());
        let controller = Arc::new(OAuthFlowController::new(
            ProviderId::OpenAiCodex,
            OAuthClient::new(settings.clone(), http()),
            Arc::clone(&store),
            browser.clone(),
        ));
        Self { controller, browser, store, settings, dir }
    }

    pub fn port(&self) -> u16 {
        self.settings.callback_port()
    }

    /// Loopback callback URL with the given raw query string.
    pub fn callback_url(&self, query: &str) -> String {
        format!("http://127.0.0.1:{}/auth/callback?{query}", self.port())
    }

    /// Persist OAuth credentials expiring `expires_in` from now.
    pub async fn seed_credentials(&self, expires_in: chrono::Duration) {
        let now = Utc::now();
        let credentials = StoredCredentials {
            access_token: "access-0".to_string(),
            refresh_token: "refresh-0".to_string(),
            id_token: None,
            expires_at: now + expires_in,
            connected_at: now,
            account_id: Some("acct_0".to_string()),
            email: Some("user@example.com".to_string()),
        };
        assert!(self.store.set(CredentialPayload::from(&credentials)).await);
    }
}

/// `state` query parameter of an authorization URL.
pub fn state_of(authorization_url: &str) -> String {
    url::Url::parse(authorization_url)
        .expect("authorization url")
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter")
}

/// Token endpoint success body.
pub fn token_body(access_token: &str, refresh_token: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "access_token": access_token,
        "id_token": fake_id_token("user@example.com", "acct_123"),
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    body
}
