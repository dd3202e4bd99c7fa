//! Tabula - provider credential command line
//!
//! Thin shell over the application commands: print tokens, sign in, inspect
//! and clear stored credentials.

use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tabula_common::redact_secret;
use tabula_domain::ProviderId;
use tabula_lib::utils::logging::init_tracing;
use tabula_lib::{commands, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(name = "tabula", version, about = "Tabula provider credentials")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, env = "TABULA_JSON_LOGS", default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print a valid token, refreshing it if needed.
    Token {
        /// Provider id (anthropic, openai, openai-codex).
        provider: ProviderId,
        /// Print the full secret instead of a redacted form.
        #[arg(long)]
        reveal: bool,
    },
    /// Sign in through the browser.
    Connect { provider: ProviderId },
    /// Show connection status and subsystem health.
    Status,
    /// Remove a provider's stored credentials.
    Disconnect { provider: ProviderId },
    /// Store an API key for a static-key provider.
    SetKey { provider: ProviderId, key: String },
    /// Remove every stored credential.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let config = tabula_infra::load().context("failed to load configuration")?;
    let ctx = Arc::new(AppContext::new(config).context("failed to initialize credentials")?);
    ctx.start().await;
    info!(version = env!("CARGO_PKG_VERSION"), "tabula starting");

    let result = run(&ctx, cli.command).await;
    ctx.shutdown().await?;
    result
}

async fn run(ctx: &AppContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Token { provider, reveal } => {
            let token = commands::get_token(ctx, provider)
                .await
                .with_context(|| format!("no valid credential for {provider}"))?;
            if reveal {
                println!("{}", token.token);
            } else {
                println!("{}", redact_secret(&token.token));
            }
            if let Some(expires_at) = token.expires_at {
                println!("expires at {expires_at}");
            }
        }
        Command::Connect { provider } => {
            let url = commands::begin_connect(ctx, provider).await?;
            println!("Opening browser for sign-in. If it does not open, visit:\n{url}");
            let outcome = commands::await_connect(ctx, provider).await?;
            if outcome.success {
                let status = commands::connect_status(ctx, provider).await;
                println!("Connected to {provider}{}", status.email.map(|e| format!(" as {e}")).unwrap_or_default());
            } else {
                anyhow::bail!(outcome.error.unwrap_or_else(|| "sign-in failed".to_string()));
            }
        }
        Command::Status => {
            let report = serde_json::json!({
                "providers": commands::connection_statuses(ctx).await,
                "health": ctx.health_check().await,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Disconnect { provider } => {
            if !commands::disconnect(ctx, provider).await {
                anyhow::bail!("could not clear stored credentials for {provider}");
            }
            println!("Disconnected {provider}");
        }
        Command::SetKey { provider, key } => {
            if !commands::set_api_key(ctx, provider, &key).await? {
                anyhow::bail!("could not store the API key; is OS encryption available?");
            }
            println!("Stored API key for {provider}");
        }
        Command::Logout => {
            if !commands::logout_all(ctx).await {
                anyhow::bail!("some credentials could not be cleared");
            }
            println!("Logged out of all providers");
        }
    }
    Ok(())
}
