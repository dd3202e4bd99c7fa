//! Credential commands - the shell's entry points into the token lifecycle
//!
//! None of these surface raw I/O or HTTP errors. Token lookups degrade to
//! `None`/`false`, interactive sign-in reports a [`ConnectResult`], and only
//! requests that make no sense for a provider (an API key for an OAuth
//! provider, sign-in for a static-key provider) return an error.

use std::time::Instant;

use tabula_common::auth::CredentialSource;
use tabula_domain::{ConnectResult, ConnectionStatus, ProviderId, Result, TabulaError, TokenInfo};
use tracing::info;

use crate::context::{unsupported, AppContext};
use crate::utils::logging::log_command_execution;

/// Get a usable token for `provider`, refreshing it first when it is close
/// to expiry. `None` means the user has to connect or configure a key.
pub async fn get_token(ctx: &AppContext, provider: ProviderId) -> Option<TokenInfo> {
    let start = Instant::now();
    let token = ctx.token_manager.get_valid_token(provider).await;
    log_command_execution("auth::get_token", Some(provider.as_str()), start.elapsed(), token.is_some());
    token
}

/// Whether `provider` has an unexpired credential, without refreshing.
pub async fn has_token(ctx: &AppContext, provider: ProviderId) -> bool {
    ctx.token_manager.has_valid_token(provider).await
}

/// Start interactive sign-in and return the authorization URL.
///
/// The browser is opened as part of this call; the URL is returned so a
/// headless shell can show it instead.
///
/// # Errors
/// `TabulaError::InvalidInput` for static-key providers; the flow's failure
/// (e.g. a busy callback port) otherwise.
pub async fn begin_connect(ctx: &AppContext, provider: ProviderId) -> Result<String> {
    let controller =
        ctx.oauth_controller(provider).ok_or_else(|| unsupported(provider, "interactive sign-in"))?;

    let start = Instant::now();
    let result = controller.start_auth_flow().await.map_err(TabulaError::from);
    log_command_execution("auth::begin_connect", Some(provider.as_str()), start.elapsed(), result.is_ok());
    result
}

/// Wait for the sign-in started by [`begin_connect`] to finish.
///
/// # Errors
/// `TabulaError::InvalidInput` for static-key providers.
pub async fn await_connect(ctx: &AppContext, provider: ProviderId) -> Result<ConnectResult> {
    let controller =
        ctx.oauth_controller(provider).ok_or_else(|| unsupported(provider, "interactive sign-in"))?;

    let start = Instant::now();
    let outcome = controller.wait_for_outcome().await;
    log_command_execution("auth::await_connect", Some(provider.as_str()), start.elapsed(), outcome.success);
    Ok(outcome)
}

/// Run interactive sign-in to completion.
///
/// # Errors
/// `TabulaError::InvalidInput` for static-key providers.
pub async fn connect(ctx: &AppContext, provider: ProviderId) -> Result<ConnectResult> {
    let controller =
        ctx.oauth_controller(provider).ok_or_else(|| unsupported(provider, "interactive sign-in"))?;

    let start = Instant::now();
    let outcome = controller.connect().await;
    log_command_execution("auth::connect", Some(provider.as_str()), start.elapsed(), outcome.success);
    Ok(outcome)
}

/// Connection summary for one provider, without secrets.
pub async fn connect_status(ctx: &AppContext, provider: ProviderId) -> ConnectionStatus {
    if let Some(controller) = ctx.oauth_controller(provider) {
        return controller.connection_status().await;
    }

    match ctx.static_key_source(provider) {
        Some(source) => ConnectionStatus {
            connected: source.current().await.is_some(),
            ..ConnectionStatus::disconnected(provider)
        },
        None => ConnectionStatus::disconnected(provider),
    }
}

/// Connection summaries for every provider.
pub async fn connection_statuses(ctx: &AppContext) -> Vec<ConnectionStatus> {
    let mut statuses = Vec::new();
    for provider in ctx.providers() {
        statuses.push(connect_status(ctx, provider).await);
    }
    statuses
}

/// Remove `provider`'s credentials and stop its background refresh.
///
/// Returns `false` when the cleared state could not be persisted.
pub async fn disconnect(ctx: &AppContext, provider: ProviderId) -> bool {
    let start = Instant::now();
    let cleared = if let Some(controller) = ctx.oauth_controller(provider) {
        controller.disconnect().await
    } else if let Some(source) = ctx.static_key_source(provider) {
        source.clear().await
    } else {
        false
    };
    ctx.token_manager.reset(provider);

    log_command_execution("auth::disconnect", Some(provider.as_str()), start.elapsed(), cleared);
    cleared
}

/// Store an API key for a static-key provider. An empty key removes it.
///
/// # Errors
/// `TabulaError::InvalidInput` for OAuth providers.
pub async fn set_api_key(ctx: &AppContext, provider: ProviderId, api_key: &str) -> Result<bool> {
    let source =
        ctx.static_key_source(provider).ok_or_else(|| unsupported(provider, "API keys"))?;

    let start = Instant::now();
    let stored = source.set_api_key(api_key).await;
    ctx.token_manager.reset(provider);
    log_command_execution("auth::set_api_key", Some(provider.as_str()), start.elapsed(), stored);
    Ok(stored)
}

/// Disconnect every provider and drop all refresh state.
///
/// Returns `false` if any provider's credentials could not be cleared.
pub async fn logout_all(ctx: &AppContext) -> bool {
    let start = Instant::now();
    let mut all_cleared = true;
    for provider in ctx.providers() {
        all_cleared &= disconnect(ctx, provider).await;
    }
    ctx.token_manager.clear_all();

    info!(all_cleared, "Logged out of all providers");
    log_command_execution("auth::logout_all", None, start.elapsed(), all_cleared);
    all_cleared
}
