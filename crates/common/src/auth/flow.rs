//! Interactive Authorization Code + PKCE flow and OAuth credential lifecycle
//!
//! One [`OAuthFlowController`] exists per OAuth provider. It owns:
//! - the pending authorization (PKCE pair, state, loopback listener),
//! - the provider's encrypted credential store,
//! - the refresh-token grant, re-arming the proactive timer on its own
//!   fixed cadence through an attached [`RefreshScheduler`].
//!
//! Flow progress is published on a `watch` channel so any number of
//! observers can follow `Idle → AuthorizationRequested → AwaitingCallback →
//! Exchanging → Connected | Failed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tabula_domain::{
    AuthFailure, ConnectResult, ConnectionStatus, CredentialPayload, FlowStatus, ProviderId,
    StoredCredentials, TokenInfo,
};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::callback::{CallbackEvent, CallbackListener, CallbackReply};
use super::client::{OAuthClient, OAuthClientError};
use super::pkce::{generate_state, validate_state, PkcePair};
use super::traits::{BrowserOpener, CredentialSource, RefreshError, RefreshScheduler};
use super::types::CallbackParams;
use crate::security::CredentialStore;

/// A fixed-cadence refresh never waits past this share of the remaining
/// token lifetime.
const MAX_LIFETIME_SHARE: f64 = 0.8;

/// Delay until the next proactive refresh on a provider's own cadence.
fn cadence_delay(interval: Duration, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let lifetime = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
    interval.min(lifetime.mul_f64(MAX_LIFETIME_SHARE))
}

/// Secrets of one authorization attempt. Lives only inside the driver task.
struct PendingAuth {
    pkce: PkcePair,
    state: String,
    listener: CallbackListener,
}

struct ActiveFlow {
    cancel: oneshot::Sender<()>,
    driver: JoinHandle<()>,
}

/// Connect flow and refresh grant for one OAuth provider
pub struct OAuthFlowController {
    provider: ProviderId,
    client: OAuthClient,
    store: Arc<CredentialStore>,
    browser: Arc<dyn BrowserOpener>,
    scheduler: OnceLock<Weak<dyn RefreshScheduler>>,
    status: watch::Sender<FlowStatus>,
    active: Mutex<Option<ActiveFlow>>,
    /// Bumped whenever stored credentials are replaced or cleared outside
    /// the refresh path; a refresh that started under an older generation
    /// discards its result.
    generation: AtomicU64,
}

impl std::fmt::Debug for OAuthFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthFlowController")
            .field("provider", &self.provider)
            .field("status", &*self.status.borrow())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl OAuthFlowController {
    /// Create a controller.
    ///
    /// # Arguments
    /// * `provider` - OAuth provider served by this controller
    /// * `client` - Token endpoint client configured for the provider
    /// * `store` - The provider's credential store
    /// * `browser` - Opens the authorization URL
    #[must_use]
    pub fn new(
        provider: ProviderId,
        client: OAuthClient,
        store: Arc<CredentialStore>,
        browser: Arc<dyn BrowserOpener>,
    ) -> Self {
        let (status, _) = watch::channel(FlowStatus::Idle);
        Self {
            provider,
            client,
            store,
            browser,
            scheduler: OnceLock::new(),
            status,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Attach the owner of the proactive refresh timers. Only the first
    /// attachment takes effect.
    pub fn attach_scheduler(&self, scheduler: Weak<dyn RefreshScheduler>) {
        if self.scheduler.set(scheduler).is_err() {
            debug!(provider = %self.provider, "Refresh scheduler already attached");
        }
    }

    /// Provider this controller signs in to.
    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Current flow status.
    #[must_use]
    pub fn status(&self) -> FlowStatus {
        self.status.borrow().clone()
    }

    /// Receiver following every flow status change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FlowStatus> {
        self.status.subscribe()
    }

    /// Begin an interactive authorization.
    ///
    /// A pending authorization is cancelled first and its listener closed.
    /// Returns the authorization URL, which has already been handed to the
    /// browser opener.
    ///
    /// # Errors
    /// [`AuthFailure::ListenerUnavailable`] when the callback port cannot be
    /// bound. The flow status is `Failed` in that case.
    pub async fn start_auth_flow(self: &Arc<Self>) -> Result<String, AuthFailure> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(provider = %self.provider, "Superseding pending authorization");
            Self::cancel_flow(previous).await;
        }

        self.publish(FlowStatus::AuthorizationRequested);

        let settings = self.client.settings();
        let port = settings.callback_port();
        let (listener, events) = match CallbackListener::bind(port, &settings.callback_path()).await
        {
            Ok(bound) => bound,
            Err(e) => {
                let failure = AuthFailure::ListenerUnavailable { port, reason: e.to_string() };
                error!(provider = %self.provider, port, error = %e, "Failed to bind OAuth callback listener");
                self.publish(FlowStatus::Failed { reason: failure.clone() });
                return Err(failure);
            }
        };

        let pkce = PkcePair::generate();
        let state = generate_state();
        let authorization_url = self.client.authorization_url(&pkce, &state);

        if let Err(e) = self.browser.open(&authorization_url) {
            warn!(provider = %self.provider, error = %e, "Failed to open browser; the authorization URL must be opened manually");
        }
        self.publish(FlowStatus::AwaitingCallback {
            authorization_url: authorization_url.clone(),
        });

        let (cancel, cancelled) = oneshot::channel();
        let timeout = settings.callback_timeout();
        let this = Arc::clone(self);
        let driver = tokio::spawn(async move {
            this.drive(PendingAuth { pkce, state, listener }, events, cancelled, timeout).await;
        });
        *active = Some(ActiveFlow { cancel, driver });

        info!(provider = %self.provider, port, "Awaiting OAuth callback");
        Ok(authorization_url)
    }

    /// Wait until the current flow leaves the pending states.
    ///
    /// A flow that was cancelled, or no flow at all, reports
    /// [`AuthFailure::Cancelled`].
    pub async fn wait_for_outcome(&self) -> ConnectResult {
        let mut status = self.status.subscribe();
        let settled = status.wait_for(|s| !s.is_pending()).await.map(|s| (*s).clone());
        settled
            .ok()
            .and_then(|s| s.outcome())
            .unwrap_or_else(|| ConnectResult::failed(AuthFailure::Cancelled))
    }

    /// Start a flow and wait for its outcome.
    pub async fn connect(self: &Arc<Self>) -> ConnectResult {
        if let Err(failure) = self.start_auth_flow().await {
            return ConnectResult::failed(failure);
        }
        self.wait_for_outcome().await
    }

    /// Cancel any pending flow and timer, then clear stored credentials.
    ///
    /// Returns `false` when the empty payload could not be persisted.
    pub async fn disconnect(&self) -> bool {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            Self::cancel_flow(previous).await;
        }

        let cleared = self.forget_credentials().await;
        self.publish(FlowStatus::Idle);
        info!(provider = %self.provider, "Provider disconnected");
        cleared
    }

    /// Connection summary without secrets.
    pub async fn connection_status(&self) -> ConnectionStatus {
        match self.store.get().await.stored_credentials() {
            Some(credentials) => ConnectionStatus {
                provider: self.provider,
                connected: true,
                email: credentials.email,
                account_id: credentials.account_id,
                expires_at: Some(credentials.expires_at),
                connected_at: Some(credentials.connected_at),
            },
            None => ConnectionStatus::disconnected(self.provider),
        }
    }

    /// Re-arm the proactive timer for credentials persisted by an earlier
    /// process. Returns whether credentials were found.
    pub async fn resume(&self) -> bool {
        match self.store.get().await.stored_credentials() {
            Some(credentials) => {
                self.arm_refresh(credentials.expires_at, Utc::now());
                true
            }
            None => false,
        }
    }

    fn publish(&self, status: FlowStatus) {
        debug!(provider = %self.provider, status = ?status, "OAuth flow status");
        self.status.send_replace(status);
    }

    fn scheduler(&self) -> Option<Arc<dyn RefreshScheduler>> {
        self.scheduler.get().and_then(Weak::upgrade)
    }

    fn arm_refresh(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let Some(scheduler) = self.scheduler() else {
            return;
        };
        let delay =
            cadence_delay(self.client.settings().refresh_interval(), expires_at, now);
        scheduler.schedule_refresh_in(self.provider, delay);
    }

    async fn forget_credentials(&self) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(scheduler) = self.scheduler() {
            scheduler.cancel_refresh(self.provider);
        }
        self.store.clear().await
    }

    async fn cancel_flow(flow: ActiveFlow) {
        let _ = flow.cancel.send(());
        if let Err(e) = flow.driver.await {
            if e.is_panic() {
                error!(error = %e, "OAuth flow driver panicked");
            }
        }
    }

    fn token_info(&self, credentials: &StoredCredentials) -> TokenInfo {
        let settings = self.client.settings();
        let mut token = TokenInfo::expiring(
            self.provider,
            credentials.access_token.clone(),
            credentials.expires_at,
        );
        if let Some(base_url) = &settings.base_url {
            token = token.with_base_url(base_url.clone());
        }
        if let (Some(header), Some(account_id)) = (&settings.account_header, &credentials.account_id)
        {
            token = token.with_header(header.clone(), account_id.clone());
        }
        token
    }

    async fn drive(
        self: Arc<Self>,
        pending: PendingAuth,
        mut events: mpsc::Receiver<CallbackEvent>,
        mut cancelled: oneshot::Receiver<()>,
        timeout: Duration,
    ) {
        let PendingAuth { pkce, state, listener } = pending;

        let outcome = tokio::select! {
            _ = &mut cancelled => None,
            () = tokio::time::sleep(timeout) => Some(Err(AuthFailure::CallbackTimeout)),
            event = events.recv() => Some(match event {
                Some(CallbackEvent { params, reply }) => {
                    let result = self.complete_authorization(params, &pkce, &state).await;
                    let page = if result.is_ok() { CallbackReply::Success } else { CallbackReply::Failure };
                    let _ = reply.send(page);
                    result
                }
                None => Err(AuthFailure::ListenerUnavailable {
                    port: listener.port(),
                    reason: "listener stopped".to_string(),
                }),
            }),
        };

        listener.shutdown().await;
        drop(pkce);

        match outcome {
            None => debug!(provider = %self.provider, "Authorization flow cancelled"),
            Some(Ok(())) => {
                info!(provider = %self.provider, "Provider connected");
                self.publish(FlowStatus::Connected);
            }
            Some(Err(failure)) => {
                warn!(provider = %self.provider, failure = %failure, "Authorization flow failed");
                self.publish(FlowStatus::Failed { reason: failure });
            }
        }
    }

    async fn complete_authorization(
        &self,
        params: CallbackParams,
        pkce: &PkcePair,
        expected_state: &str,
    ) -> Result<(), AuthFailure> {
        if let Some(error) = params.error {
            return Err(AuthFailure::OAuthProviderError {
                error,
                description: params.error_description,
            });
        }

        if !validate_state(expected_state, params.state.as_deref().unwrap_or_default()) {
            error!(provider = %self.provider, "OAuth callback state mismatch; rejecting callback");
            return Err(AuthFailure::StateMismatch);
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthFailure::MissingAuthorizationCode)?;

        self.publish(FlowStatus::Exchanging);
        let response = self.client.exchange_code(&code, &pkce.verifier).await.map_err(|e| {
            warn!(provider = %self.provider, error = %e, "Authorization code exchange failed");
            AuthFailure::ExchangeFailed(e.to_string())
        })?;

        let now = Utc::now();
        let credentials = response
            .into_credentials(now)
            .ok_or_else(|| AuthFailure::ExchangeFailed("no refresh token issued".to_string()))?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        if !self.store.set(CredentialPayload::from(&credentials)).await {
            self.store.invalidate_cache();
            return Err(AuthFailure::EncryptionUnavailable(
                "credentials could not be persisted".to_string(),
            ));
        }

        self.arm_refresh(credentials.expires_at, now);
        debug!(
            provider = %self.provider,
            has_account = credentials.account_id.is_some(),
            expires_in_secs = credentials.seconds_until_expiry(now),
            "Stored OAuth credentials"
        );
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for OAuthFlowController {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn current(&self) -> Option<TokenInfo> {
        self.store.get().await.stored_credentials().map(|c| self.token_info(&c))
    }

    async fn refresh(&self) -> Result<TokenInfo, RefreshError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let Some(mut credentials) = self.store.get().await.stored_credentials() else {
            return Err(RefreshError::NoCredential);
        };

        let response = match self.client.refresh(&credentials.refresh_token).await {
            Ok(response) => response,
            Err(OAuthClientError::NoRefreshToken) => return Err(RefreshError::NoCredential),
            Err(e) if e.is_auth_rejection() => {
                let status = e.status().unwrap_or_default();
                warn!(provider = %self.provider, status, "Refresh token rejected; clearing credentials");
                self.forget_credentials().await;
                return Err(RefreshError::Rejected { status });
            }
            Err(e) => return Err(RefreshError::Transient(e.to_string())),
        };

        let now = Utc::now();
        response.apply_refresh(&mut credentials, now);

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(provider = %self.provider, "Credentials changed during refresh; discarding result");
            return self.current().await.ok_or(RefreshError::NoCredential);
        }

        if !self.store.set(CredentialPayload::from(&credentials)).await {
            warn!(provider = %self.provider, "Refreshed token could not be persisted");
        }
        self.arm_refresh(credentials.expires_at, now);
        info!(provider = %self.provider, expires_in_secs = credentials.seconds_until_expiry(now), "Access token refreshed");

        Ok(self.token_info(&credentials))
    }

    fn self_scheduling(&self) -> bool {
        true
    }
}
