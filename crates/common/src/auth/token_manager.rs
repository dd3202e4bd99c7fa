//! Token manager with single-flight refresh
//!
//! The façade the rest of the application calls to obtain a usable token:
//! - At most one refresh per provider at a time; concurrent callers join it
//! - Refresh inside the expiry buffer (default 5 min) before returning
//! - Exponential backoff with a failure-history penalty and jitter
//! - One-shot proactive refresh timers per provider

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tabula_domain::{ProviderId, RefreshPolicy, RefreshState, TokenInfo};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::traits::{CredentialSource, RefreshScheduler};
use crate::resilience::{jitter_offset_ms, RefreshBackoff};

/// Lower bound for re-arming after a refresh whose token is already inside
/// the expiry buffer.
const MIN_REARM_DELAY: Duration = Duration::from_secs(1);

type SharedRefresh = Shared<BoxFuture<'static, Option<TokenInfo>>>;

struct InFlight {
    id: u64,
    result: SharedRefresh,
}

struct ArmedTimer {
    id: u64,
    task: JoinHandle<()>,
}

/// Releases the in-flight slot when a refresh task ends, including by panic.
struct FlightGuard {
    manager: Arc<TokenManager>,
    provider: ProviderId,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.manager.release(self.provider, self.id) {
            if let Some(state) = self.manager.states.lock().get_mut(&self.provider) {
                state.is_refreshing = false;
            }
        }
    }
}

/// Token manager over a fixed set of credential sources
///
/// Construct with [`TokenManager::new`], which returns an `Arc`: refresh
/// tasks and timers hold weak references back to the manager.
pub struct TokenManager {
    sources: HashMap<ProviderId, Arc<dyn CredentialSource>>,
    policy: RefreshPolicy,
    backoff: RefreshBackoff,
    states: Mutex<HashMap<ProviderId, RefreshState>>,
    in_flight: Mutex<HashMap<ProviderId, InFlight>>,
    timers: Mutex<HashMap<ProviderId, ArmedTimer>>,
    next_id: AtomicU64,
    this: Weak<Self>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("providers", &self.sources.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("in_flight", &self.in_flight.lock().len())
            .field("timers", &self.timers.lock().len())
            .finish()
    }
}

impl TokenManager {
    /// Create a manager.
    ///
    /// # Arguments
    /// * `sources` - One credential source per provider; a later source for
    ///   the same provider replaces an earlier one
    /// * `policy` - Expiry buffer, retry and backoff tuning
    pub fn new(
        sources: impl IntoIterator<Item = Arc<dyn CredentialSource>>,
        policy: RefreshPolicy,
    ) -> Arc<Self> {
        let sources: HashMap<_, _> =
            sources.into_iter().map(|source| (source.provider(), source)).collect();
        let states = sources.keys().map(|provider| (*provider, RefreshState::default())).collect();

        Arc::new_cyclic(|this| Self {
            backoff: RefreshBackoff::from_policy(&policy),
            sources,
            policy,
            states: Mutex::new(states),
            in_flight: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    /// Providers with a registered credential source.
    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.sources.keys().copied()
    }

    /// Credential source registered for `provider`.
    #[must_use]
    pub fn source(&self, provider: ProviderId) -> Option<&Arc<dyn CredentialSource>> {
        self.sources.get(&provider)
    }

    /// Retry and buffer policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Get a currently usable token.
    ///
    /// Joins a refresh already in flight. Otherwise returns the stored token,
    /// refreshing first when it expires within the expiry buffer. Static keys
    /// are returned as stored. `None` when there is no credential or every
    /// refresh attempt failed.
    pub async fn get_valid_token(&self, provider: ProviderId) -> Option<TokenInfo> {
        let joined = self.in_flight.lock().get(&provider).map(|flight| flight.result.clone());
        if let Some(result) = joined {
            debug!(provider = %provider, "Joining in-flight refresh");
            return result.await;
        }

        let token = self.sources.get(&provider)?.current().await?;
        if !token.expires_within(self.policy.expiry_buffer(), Utc::now()) {
            return Some(token);
        }

        debug!(provider = %provider, "Token within expiry buffer; refreshing");
        self.refresh(provider).await
    }

    /// True when a token exists and is not past its expiry. Never refreshes.
    pub async fn has_valid_token(&self, provider: ProviderId) -> bool {
        let Some(source) = self.sources.get(&provider) else {
            return false;
        };
        source.current().await.is_some_and(|token| !token.is_expired(Utc::now()))
    }

    /// Refresh now, or join the refresh already in flight.
    pub async fn refresh(&self, provider: ProviderId) -> Option<TokenInfo> {
        self.start_or_join(provider)?.await
    }

    /// Snapshot of a provider's refresh bookkeeping.
    #[must_use]
    pub fn refresh_state(&self, provider: ProviderId) -> RefreshState {
        self.states.lock().get(&provider).cloned().unwrap_or_default()
    }

    /// Whether a proactive refresh timer is armed for `provider`.
    #[must_use]
    pub fn is_timer_armed(&self, provider: ProviderId) -> bool {
        self.timers.lock().contains_key(&provider)
    }

    /// Arm proactive refreshes for stored expiring tokens of sources that do
    /// not schedule themselves.
    pub async fn resume_schedules(&self) {
        for (provider, source) in &self.sources {
            if source.self_scheduling() {
                continue;
            }
            if let Some(expires_at) = source.current().await.and_then(|token| token.expires_at) {
                self.schedule_refresh(*provider, expires_at);
            }
        }
    }

    /// Drop every in-flight refresh handle, disarm every timer and reset all
    /// failure counters. Stored credentials are untouched.
    pub fn clear_all(&self) {
        self.in_flight.lock().clear();
        for (_, timer) in self.timers.lock().drain() {
            timer.task.abort();
        }
        for state in self.states.lock().values_mut() {
            state.reset();
        }
        info!("Cleared all token refresh state");
    }

    /// Forget refresh state for one provider after its credentials were
    /// cleared.
    pub fn reset(&self, provider: ProviderId) {
        self.in_flight.lock().remove(&provider);
        self.disarm(provider);
        if let Some(state) = self.states.lock().get_mut(&provider) {
            state.reset();
        }
        debug!(provider = %provider, "Refresh state reset");
    }

    fn start_or_join(&self, provider: ProviderId) -> Option<SharedRefresh> {
        let source = Arc::clone(self.sources.get(&provider)?);

        let mut in_flight = self.in_flight.lock();
        if let Some(flight) = in_flight.get(&provider) {
            return Some(flight.result.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let this = self.this.clone();
        let task = tokio::spawn(async move {
            let manager = this.upgrade()?;
            let guard = FlightGuard { manager: Arc::clone(&manager), provider, id };
            let token = manager.run_refresh(provider, id, source).await;
            drop(guard);
            token
        });

        let result = async move {
            task.await.unwrap_or_else(|e| {
                error!(provider = %provider, error = %e, "Token refresh task failed");
                None
            })
        }
        .boxed()
        .shared();

        in_flight.insert(provider, InFlight { id, result: result.clone() });
        Some(result)
    }

    /// Remove the in-flight slot if it still belongs to refresh `id`.
    fn release(&self, provider: ProviderId, id: u64) -> bool {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&provider).is_some_and(|flight| flight.id == id) {
            in_flight.remove(&provider);
            true
        } else {
            false
        }
    }

    async fn run_refresh(
        &self,
        provider: ProviderId,
        id: u64,
        source: Arc<dyn CredentialSource>,
    ) -> Option<TokenInfo> {
        let consecutive_failures = {
            let mut states = self.states.lock();
            let state = states.entry(provider).or_default();
            state.begin();
            state.consecutive_failures
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        let outcome = loop {
            match source.refresh().await {
                Ok(token) => break Ok(token),
                Err(e) => {
                    attempt += 1;
                    warn!(provider = %provider, attempt, max_attempts, error = %e, "Token refresh attempt failed");
                    if !e.is_retryable() || attempt >= max_attempts {
                        break Err(e);
                    }
                    let delay = self.backoff.delay(attempt - 1, consecutive_failures);
                    debug!(provider = %provider, delay_ms = delay.as_millis(), "Backing off before next refresh attempt");
                    tokio::time::sleep(delay).await;
                }
            }
        };

        let current = self.release(provider, id);
        let now = Utc::now();
        match outcome {
            Ok(token) => {
                if current {
                    if let Some(state) = self.states.lock().get_mut(&provider) {
                        state.succeed(now);
                    }
                    if !source.self_scheduling() {
                        if let Some(expires_at) = token.expires_at {
                            self.arm_after_refresh(provider, expires_at, now);
                        }
                    }
                }
                debug!(provider = %provider, "Token refresh succeeded");
                Some(token)
            }
            Err(e) => {
                if current {
                    if let Some(state) = self.states.lock().get_mut(&provider) {
                        if e.is_retryable() {
                            state.exhaust(now);
                        } else {
                            state.abandon(now);
                        }
                    }
                }
                warn!(provider = %provider, attempts = attempt, error = %e, "Token refresh gave up");
                None
            }
        }
    }

    /// Delay until `expires_at - buffer` plus jitter, or `None` when due.
    fn refresh_delay(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        let buffer = self.policy.expiry_buffer();
        let refresh_at =
            expires_at.checked_sub_signed(chrono::Duration::from_std(buffer).ok()?)?;
        let until = (refresh_at - now).to_std().ok().filter(|d| !d.is_zero())?;

        let offset = jitter_offset_ms(buffer, self.policy.jitter_ratio);
        let magnitude = Duration::from_millis(offset.unsigned_abs());
        Some(if offset >= 0 { until.saturating_add(magnitude) } else { until.saturating_sub(magnitude) })
    }

    fn arm_after_refresh(&self, provider: ProviderId, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let delay = self.refresh_delay(expires_at, now).unwrap_or_else(|| {
            let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
            (remaining / 2).max(MIN_REARM_DELAY)
        });
        self.arm(provider, delay);
    }

    fn arm(&self, provider: ProviderId, delay: Duration) {
        let mut timers = self.timers.lock();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let this = self.this.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(manager) = this.upgrade() else {
                return;
            };
            if !manager.take_timer(provider, id) {
                return;
            }
            debug!(provider = %provider, "Proactive refresh timer fired");
            if let Some(result) = manager.start_or_join(provider) {
                result.await;
            }
        });

        if let Some(previous) = timers.insert(provider, ArmedTimer { id, task }) {
            previous.task.abort();
        }
        debug!(provider = %provider, delay_secs = delay.as_secs(), "Proactive refresh armed");
    }

    /// Claim a fired timer's slot; false when it was disarmed or replaced.
    fn take_timer(&self, provider: ProviderId, id: u64) -> bool {
        let mut timers = self.timers.lock();
        if timers.get(&provider).is_some_and(|timer| timer.id == id) {
            timers.remove(&provider);
            true
        } else {
            false
        }
    }

    fn disarm(&self, provider: ProviderId) {
        if let Some(timer) = self.timers.lock().remove(&provider) {
            timer.task.abort();
            debug!(provider = %provider, "Proactive refresh disarmed");
        }
    }
}

impl RefreshScheduler for TokenManager {
    fn schedule_refresh(&self, provider: ProviderId, expires_at: DateTime<Utc>) {
        match self.refresh_delay(expires_at, Utc::now()) {
            Some(delay) => self.arm(provider, delay),
            None => {
                debug!(provider = %provider, "Refresh already due; starting now");
                self.disarm(provider);
                let _ = self.start_or_join(provider);
            }
        }
    }

    fn schedule_refresh_in(&self, provider: ProviderId, delay: Duration) {
        self.arm(provider, delay);
    }

    fn cancel_refresh(&self, provider: ProviderId) {
        self.disarm(provider);
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::token_manager.
    use super::*;
    use crate::auth::RefreshError;
    use crate::testing::MockCredentialSource;

    fn manager(source: Arc<MockCredentialSource>) -> Arc<TokenManager> {
        TokenManager::new([source as Arc<dyn CredentialSource>], RefreshPolicy::default())
    }

    /// Validates a token outside the buffer is returned without refreshing.
    #[tokio::test]
    async fn test_fresh_token_not_refreshed() {
        let source = Arc::new(MockCredentialSource::expiring_in(
            ProviderId::OpenAiCodex,
            chrono::Duration::minutes(10),
        ));
        let manager = manager(Arc::clone(&source));

        let token = manager.get_valid_token(ProviderId::OpenAiCodex).await.unwrap();
        assert_eq!(token.token, "initial");
        assert_eq!(source.refresh_calls(), 0);
    }

    /// Validates unknown providers yield nothing.
    #[tokio::test]
    async fn test_unknown_provider() {
        let source = Arc::new(MockCredentialSource::static_key(ProviderId::Anthropic, "k"));
        let manager = manager(source);

        assert!(manager.get_valid_token(ProviderId::OpenAi).await.is_none());
        assert!(!manager.has_valid_token(ProviderId::OpenAi).await);
    }

    /// Validates an exhausted sequence increments the failure counter and a
    /// success resets it.
    #[tokio::test(start_paused = true)]
    async fn test_failure_counter() {
        let source = Arc::new(MockCredentialSource::expiring_in(
            ProviderId::OpenAiCodex,
            chrono::Duration::minutes(1),
        ));
        source.fail_next(3, RefreshError::Transient("503".into()));
        let manager = manager(Arc::clone(&source));

        assert!(manager.get_valid_token(ProviderId::OpenAiCodex).await.is_none());
        assert_eq!(source.refresh_calls(), 3);
        let state = manager.refresh_state(ProviderId::OpenAiCodex);
        assert_eq!(state.consecutive_failures, 1);
        assert!(!state.is_refreshing);

        assert!(manager.get_valid_token(ProviderId::OpenAiCodex).await.is_some());
        assert_eq!(manager.refresh_state(ProviderId::OpenAiCodex).consecutive_failures, 0);
    }

    /// Validates non-retryable errors stop after one attempt without counting
    /// as an exhausted sequence.
    #[tokio::test]
    async fn test_non_retryable_stops_early() {
        let source = Arc::new(MockCredentialSource::expiring_in(
            ProviderId::OpenAiCodex,
            chrono::Duration::minutes(1),
        ));
        source.fail_next(3, RefreshError::Rejected { status: 400 });
        let manager = manager(Arc::clone(&source));

        assert!(manager.get_valid_token(ProviderId::OpenAiCodex).await.is_none());
        assert_eq!(source.refresh_calls(), 1);
        assert_eq!(manager.refresh_state(ProviderId::OpenAiCodex).consecutive_failures, 0);
    }

    /// Validates the proactive delay lands within jitter of refresh time.
    #[test]
    fn test_refresh_delay_window() {
        let source = Arc::new(MockCredentialSource::static_key(ProviderId::Anthropic, "k"));
        let manager = manager(source);
        let now = Utc::now();

        let delay = manager.refresh_delay(now + chrono::Duration::minutes(15), now).unwrap();
        // 10 minutes until refresh time, ±5% of the 5 minute buffer
        assert!(delay >= Duration::from_secs(585) && delay <= Duration::from_secs(615));

        assert!(manager.refresh_delay(now + chrono::Duration::minutes(4), now).is_none());
    }

    /// Validates timers are armed, replaced and cleared.
    #[tokio::test]
    async fn test_timer_arming() {
        let source = Arc::new(MockCredentialSource::static_key(ProviderId::Anthropic, "k"));
        let manager = manager(source);

        manager.schedule_refresh_in(ProviderId::Anthropic, Duration::from_secs(600));
        assert!(manager.is_timer_armed(ProviderId::Anthropic));

        manager.cancel_refresh(ProviderId::Anthropic);
        assert!(!manager.is_timer_armed(ProviderId::Anthropic));

        manager.schedule_refresh_in(ProviderId::Anthropic, Duration::from_secs(600));
        manager.clear_all();
        assert!(!manager.is_timer_armed(ProviderId::Anthropic));
    }
}
