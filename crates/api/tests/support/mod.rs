//! Shared fixtures for application-level tests

#![allow(dead_code)]

use std::sync::Arc;

use tabula_common::crypto::EncryptionService;
use tabula_common::security::{SecretCipher, StaticKeyCipher};
use tabula_common::testing::{free_port, MockBrowser};
use tabula_domain::{AuthConfig, OAuthProviderSettings};
use tabula_lib::AppContext;
use tempfile::TempDir;

pub fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().expect("build http client")
}

/// An application context over a temporary storage directory.
pub struct TestApp {
    pub ctx: AppContext,
    pub browser: Arc<MockBrowser>,
    pub key: Vec<u8>,
    pub dir: TempDir,
}

impl TestApp {
    /// Context whose token endpoint is `token_url` (unused port if `None`).
    pub fn new(token_url: Option<String>) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let key = EncryptionService::generate_key().to_vec();
        let config = config_in(&dir, token_url);
        let browser = Arc::new(MockBrowser::new());
        let ctx = AppContext::with_components(config, cipher(&key), browser.clone(), http())
            .expect("valid config");
        Self { ctx, browser, key, dir }
    }

    /// A second context over the same files and key, as after a restart.
    pub fn reopen(&self) -> AppContext {
        AppContext::with_components(
            self.ctx.config.clone(),
            cipher(&self.key),
            Arc::new(MockBrowser::new()),
            http(),
        )
        .expect("valid config")
    }

    /// Loopback callback URL with the given raw query string.
    pub fn callback_url(&self, query: &str) -> String {
        format!("http://127.0.0.1:{}/auth/callback?{query}", self.ctx.config.codex.callback_port())
    }
}

pub fn config_in(dir: &TempDir, token_url: Option<String>) -> AuthConfig {
    let token_url =
        token_url.unwrap_or_else(|| format!("http://127.0.0.1:{}/oauth/token", free_port()));
    AuthConfig {
        storage_dir: dir.path().join("credentials"),
        codex: OAuthProviderSettings {
            token_url,
            redirect_uri: format!("http://localhost:{}/auth/callback", free_port()),
            ..OAuthProviderSettings::default()
        },
        ..AuthConfig::default()
    }
}

fn cipher(key: &[u8]) -> Arc<dyn SecretCipher> {
    Arc::new(StaticKeyCipher::new(key).expect("valid key"))
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
