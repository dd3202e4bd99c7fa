//! Integration tests for the token manager
//!
//! Covers single-flight refresh, the expiry buffer boundary, static keys,
//! backoff against a flaky token endpoint, and timer cleanup on disconnect.

mod support;

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tabula_common::auth::{
    CredentialSource, RefreshScheduler, StaticKeySource, TokenManager,
};
use tabula_common::testing::{free_port, MockCredentialSource};
use tabula_domain::{OAuthProviderSettings, ProviderId, RefreshPolicy};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{settings_for, store_in, token_body, FlowFixture};

fn fast_policy() -> RefreshPolicy {
    RefreshPolicy { base_backoff_ms: 10, failure_penalty_ms: 10, ..RefreshPolicy::default() }
}

fn manager_over(source: Arc<MockCredentialSource>) -> Arc<TokenManager> {
    TokenManager::new([source as Arc<dyn CredentialSource>], RefreshPolicy::default())
}

/// Attach a manager to the fixture's controller the way the app does.
fn managed(fixture: &FlowFixture, policy: RefreshPolicy) -> Arc<TokenManager> {
    let manager = TokenManager::new(
        [Arc::clone(&fixture.controller) as Arc<dyn CredentialSource>],
        policy,
    );
    let scheduler: Weak<dyn RefreshScheduler> = Arc::downgrade(&manager) as Weak<dyn RefreshScheduler>;
    fixture.controller.attach_scheduler(scheduler);
    manager
}

/// Validates concurrent callers share one refresh and one result.
///
/// # Test Steps
/// 1. Token inside the buffer and a slow refresh
/// 2. Ten concurrent `get_valid_token` calls
/// 3. Exactly one refresh call; every caller gets the same token
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_refresh() {
    let source = Arc::new(
        MockCredentialSource::expiring_in(ProviderId::OpenAiCodex, chrono::Duration::minutes(1))
            .with_refresh_delay(Duration::from_millis(200)),
    );
    let manager = manager_over(Arc::clone(&source));

    let calls = (0..10).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get_valid_token(ProviderId::OpenAiCodex).await })
    });
    let tokens: Vec<_> = join_all(calls).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(source.refresh_calls(), 1);
    let first = tokens[0].clone().expect("refreshed token");
    assert_eq!(first.token, "refreshed-1");
    assert!(tokens.iter().all(|t| t.as_ref() == Some(&first)));
    assert!(!manager.refresh_state(ProviderId::OpenAiCodex).is_refreshing);
}

/// Validates the 5 minute buffer: 4 minutes out refreshes, 10 does not.
#[tokio::test]
async fn test_expiry_buffer_boundary() {
    let soon = Arc::new(MockCredentialSource::expiring_in(
        ProviderId::OpenAiCodex,
        chrono::Duration::minutes(4),
    ));
    let token = manager_over(Arc::clone(&soon)).get_valid_token(ProviderId::OpenAiCodex).await;
    assert_eq!(soon.refresh_calls(), 1);
    assert_eq!(token.unwrap().token, "refreshed-1");

    let later = Arc::new(MockCredentialSource::expiring_in(
        ProviderId::OpenAiCodex,
        chrono::Duration::minutes(10),
    ));
    let token = manager_over(Arc::clone(&later)).get_valid_token(ProviderId::OpenAiCodex).await;
    assert_eq!(later.refresh_calls(), 0);
    assert_eq!(token.unwrap().token, "initial");
}

/// Validates a configured static key is returned as stored, without expiry.
#[tokio::test]
async fn test_static_key_returned_unchanged() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticKeySource::new(ProviderId::Anthropic, store_in(&dir, "anthropic.enc")));
    assert!(source.set_api_key("sk-live-xxxx").await);

    let manager = TokenManager::new([source as Arc<dyn CredentialSource>], RefreshPolicy::default());
    let token = manager.get_valid_token(ProviderId::Anthropic).await.expect("static key");
    assert_eq!(token.token, "sk-live-xxxx");
    assert_eq!(token.expires_at, None);
    assert!(manager.has_valid_token(ProviderId::Anthropic).await);
    assert_eq!(manager.refresh_state(ProviderId::Anthropic).last_refresh_attempt, None);
}

/// Validates an expired OAuth token costs exactly one exchange, even with
/// concurrent callers.
#[tokio::test(flavor = "multi_thread")]
async fn test_expired_oauth_token_single_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-1", Some("refresh-1")))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fixture = FlowFixture::new(settings_for(&server));
    fixture.seed_credentials(chrono::Duration::seconds(-1)).await;
    let manager = managed(&fixture, RefreshPolicy::default());

    let (a, b) = tokio::join!(
        manager.get_valid_token(ProviderId::OpenAiCodex),
        manager.get_valid_token(ProviderId::OpenAiCodex),
    );
    let token = a.expect("refreshed token");
    assert_eq!(Some(&token), b.as_ref());
    assert_eq!(token.token, "access-1");
    assert!(token.expires_at.is_some_and(|at| at > Utc::now()));
    assert_eq!(
        token.extra_headers.as_ref().and_then(|h| h.get("chatgpt-account-id")).map(String::as_str),
        Some("acct_123")
    );

    // The controller re-armed its own cadence through the manager.
    assert!(manager.is_timer_armed(ProviderId::OpenAiCodex));
}

/// Validates transient failures are retried with backoff until success.
#[tokio::test(flavor = "multi_thread")]
async fn test_transient_failures_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-3", None)))
        .expect(1)
        .mount(&server)
        .await;

    let fixture = FlowFixture::new(settings_for(&server));
    fixture.seed_credentials(chrono::Duration::minutes(1)).await;
    let manager = managed(&fixture, fast_policy());

    let token = manager.get_valid_token(ProviderId::OpenAiCodex).await.expect("third attempt");
    assert_eq!(token.token, "access-3");
    assert_eq!(manager.refresh_state(ProviderId::OpenAiCodex).consecutive_failures, 0);
}

/// Validates an exhausted retry sequence returns nothing and counts once.
#[tokio::test(flavor = "multi_thread")]
async fn test_exhausted_refresh_returns_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let fixture = FlowFixture::new(settings_for(&server));
    fixture.seed_credentials(chrono::Duration::minutes(1)).await;
    let manager = managed(&fixture, fast_policy());

    assert!(manager.get_valid_token(ProviderId::OpenAiCodex).await.is_none());
    let state = manager.refresh_state(ProviderId::OpenAiCodex);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_refresh_attempt.is_some());

    // Credentials are kept for a later attempt.
    assert!(fixture.controller.current().await.is_some());

    manager.clear_all();
    assert_eq!(manager.refresh_state(ProviderId::OpenAiCodex).consecutive_failures, 0);
}

/// Validates disconnect disarms the timer and no refresh fires afterwards.
#[tokio::test(start_paused = true)]
async fn test_disconnect_disarms_timer() {
    // Nothing listens here; a refresh that slipped through would be recorded
    // as an attempt in the refresh state.
    let settings = OAuthProviderSettings {
        token_url: format!("http://127.0.0.1:{}/oauth/token", free_port()),
        redirect_uri: format!("http://localhost:{}/auth/callback", free_port()),
        ..OAuthProviderSettings::default()
    };
    let fixture = FlowFixture::new(settings);
    fixture.seed_credentials(chrono::Duration::hours(1)).await;
    let manager = managed(&fixture, RefreshPolicy::default());

    assert!(fixture.controller.resume().await);
    assert!(manager.is_timer_armed(ProviderId::OpenAiCodex));
    assert!(manager.has_valid_token(ProviderId::OpenAiCodex).await);

    assert!(fixture.controller.disconnect().await);
    assert!(!manager.is_timer_armed(ProviderId::OpenAiCodex));
    assert!(!manager.has_valid_token(ProviderId::OpenAiCodex).await);

    tokio::time::sleep(Duration::from_secs(4 * 3600)).await;
    assert!(!manager.is_timer_armed(ProviderId::OpenAiCodex));
    assert_eq!(manager.refresh_state(ProviderId::OpenAiCodex).last_refresh_attempt, None);
    assert!(manager.get_valid_token(ProviderId::OpenAiCodex).await.is_none());
}

/// Validates a due schedule refreshes immediately and a later one arms.
#[tokio::test]
async fn test_schedule_refresh() {
    let source = Arc::new(MockCredentialSource::expiring_in(
        ProviderId::OpenAi,
        chrono::Duration::minutes(2),
    ));
    let manager = manager_over(Arc::clone(&source));

    manager.schedule_refresh(ProviderId::OpenAi, Utc::now() + chrono::Duration::hours(1));
    assert!(manager.is_timer_armed(ProviderId::OpenAi));
    assert_eq!(source.refresh_calls(), 0);

    manager.schedule_refresh(ProviderId::OpenAi, Utc::now() + chrono::Duration::minutes(2));
    assert!(!manager.is_timer_armed(ProviderId::OpenAi));
    let token = manager.refresh(ProviderId::OpenAi).await.expect("joined refresh");
    assert_eq!(source.refresh_calls(), 1);
    assert_eq!(token.token, "refreshed-1");

    // A successful refresh of a source that does not schedule itself re-arms.
    assert!(manager.is_timer_armed(ProviderId::OpenAi));
}

/// Validates a proactive timer funnels into the refresh path when it fires.
#[tokio::test(start_paused = true)]
async fn test_timer_fires_refresh() {
    let source = Arc::new(MockCredentialSource::expiring_in(
        ProviderId::OpenAi,
        chrono::Duration::hours(1),
    ));
    let manager = manager_over(Arc::clone(&source));

    manager.schedule_refresh_in(ProviderId::OpenAi, Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(61)).await;
    // Let the spawned refresh finish.
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(source.refresh_calls(), 1);
    assert_eq!(
        manager.get_valid_token(ProviderId::OpenAi).await.map(|t| t.token),
        Some("refreshed-1".to_string())
    );
}
