//! Mock implementations of the auth and security seams
//!
//! Provides mock objects for testing purposes.

// Allow missing error/panic docs for test mocks - they are designed to be simple
// and errors are clearly indicated by their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use parking_lot::Mutex;
use tabula_domain::{ProviderId, TokenInfo};

use crate::auth::{BrowserOpener, CredentialSource, RefreshError};
use crate::crypto::CipherError;
use crate::security::SecretCipher;

/// Cipher standing in for a machine without OS-backed encryption
///
/// # Examples
///
/// ```
/// use tabula_common::security::SecretCipher;
/// use tabula_common::testing::UnavailableCipher;
///
/// assert!(!UnavailableCipher.is_available());
/// assert!(UnavailableCipher.encrypt(b"secret").is_err());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCipher;

impl SecretCipher for UnavailableCipher {
    fn is_available(&self) -> bool {
        false
    }

    fn encrypt(&self, _plaintext: &[u8]) -> Result<String, CipherError> {
        Err(CipherError::Unavailable("no OS keychain in tests".to_string()))
    }

    fn decrypt(&self, _sealed: &str) -> Result<Vec<u8>, CipherError> {
        Err(CipherError::Unavailable("no OS keychain in tests".to_string()))
    }
}

/// Browser opener that records URLs instead of launching anything
#[derive(Debug, Default)]
pub struct MockBrowser {
    opened: Mutex<Vec<String>>,
    fail: bool,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A browser that records the URL and then reports a launch failure.
    pub fn failing() -> Self {
        Self { opened: Mutex::new(Vec::new()), fail: true }
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.opened.lock().last().cloned()
    }
}

impl BrowserOpener for MockBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.lock().push(url.to_string());
        if self.fail {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no browser"));
        }
        Ok(())
    }
}

/// Scriptable credential source counting refresh calls
///
/// Refreshes succeed with a fresh token valid for one hour unless failures
/// were queued with [`MockCredentialSource::fail_next`].
#[derive(Debug)]
pub struct MockCredentialSource {
    provider: ProviderId,
    token: Mutex<Option<TokenInfo>>,
    failures: Mutex<VecDeque<RefreshError>>,
    refresh_calls: AtomicUsize,
    refresh_delay: Duration,
    self_scheduling: bool,
}

impl MockCredentialSource {
    fn with_token(provider: ProviderId, token: Option<TokenInfo>) -> Self {
        Self {
            provider,
            token: Mutex::new(token),
            failures: Mutex::new(VecDeque::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
            self_scheduling: false,
        }
    }

    /// Source holding nothing.
    pub fn empty(provider: ProviderId) -> Self {
        Self::with_token(provider, None)
    }

    /// Source holding a static key.
    pub fn static_key(provider: ProviderId, key: &str) -> Self {
        Self::with_token(provider, Some(TokenInfo::static_key(provider, key)))
    }

    /// Source holding a token named `initial` expiring `lifetime` from now.
    pub fn expiring_in(provider: ProviderId, lifetime: chrono::Duration) -> Self {
        Self::with_token(
            provider,
            Some(TokenInfo::expiring(provider, "initial", Utc::now() + lifetime)),
        )
    }

    /// Make every refresh take `delay` before completing.
    #[must_use]
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Report the source as re-arming its own timers.
    #[must_use]
    pub fn self_scheduling(mut self) -> Self {
        self.self_scheduling = true;
        self
    }

    /// Fail the next `count` refresh calls with `error`.
    pub fn fail_next(&self, count: usize, error: RefreshError) {
        let mut failures = self.failures.lock();
        failures.extend(std::iter::repeat(error).take(count));
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_token(&self, token: Option<TokenInfo>) {
        *self.token.lock() = token;
    }
}

#[async_trait]
impl CredentialSource for MockCredentialSource {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn current(&self) -> Option<TokenInfo> {
        self.token.lock().clone()
    }

    async fn refresh(&self) -> Result<TokenInfo, RefreshError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let failure = self.failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let mut token = self.token.lock();
        let refreshed = match token.as_ref() {
            None => return Err(RefreshError::NoCredential),
            Some(current) if current.is_static() => current.clone(),
            Some(_) => TokenInfo::expiring(
                self.provider,
                format!("refreshed-{call}"),
                Utc::now() + chrono::Duration::hours(1),
            ),
        };
        *token = Some(refreshed.clone());
        Ok(refreshed)
    }

    fn self_scheduling(&self) -> bool {
        self.self_scheduling
    }
}

/// Unsigned JWT carrying an email and a ChatGPT account id claim.
pub fn fake_id_token(email: &str, account_id: &str) -> String {
    let claims = serde_json::json!({
        "email": email,
        "https://api.openai.com/auth": { "chatgpt_account_id": account_id },
    });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("bind an ephemeral loopback port")
}
