use std::time::Duration;

use tabula_domain::TabulaError;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Installing twice is a
/// no-op so tests and embedders can call this freely.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Log the outcome of a command execution with structured fields.
///
/// # Parameters
/// * `command` - Logical command identifier (e.g. `"auth::get_token"`).
/// * `provider` - Provider the command acted on, if any.
/// * `elapsed` - Duration the command execution took.
/// * `success` - Whether the command completed successfully.
///
/// Callers must avoid forwarding secrets in any field.
#[inline]
pub fn log_command_execution(command: &str, provider: Option<&str>, elapsed: Duration, success: bool) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let provider = provider.unwrap_or("-");

    if success {
        info!(command, provider, duration_ms, "command_execution_success");
    } else {
        warn!(command, provider, duration_ms, "command_execution_failure");
    }
}

/// Convert a `TabulaError` into a stable label suitable for logging.
#[inline]
pub fn error_label(error: &TabulaError) -> &'static str {
    match error {
        TabulaError::Config(_) => "config",
        TabulaError::Storage(_) => "storage",
        TabulaError::Network(_) => "network",
        TabulaError::Auth(_) => "auth",
        TabulaError::Security(_) => "security",
        TabulaError::NotFound(_) => "not_found",
        TabulaError::InvalidInput(_) => "invalid_input",
        TabulaError::Internal(_) => "internal",
    }
}
