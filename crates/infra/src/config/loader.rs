//! Configuration loader
//!
//! Builds an [`AuthConfig`] from layered sources.
//!
//! ## Loading Strategy
//! 1. `.env` in the working directory is loaded into the process environment
//! 2. The first config file found by [`probe_config_paths`] is parsed, or
//!    production defaults are used
//! 3. `TABULA_*` environment variables override individual fields
//! 4. A storage directory left at its default is resolved to the per-user
//!    data directory
//! 5. The result is validated
//!
//! ## Environment Variables
//! - `TABULA_CONFIG`: Explicit config file path
//! - `TABULA_STORAGE_DIR`: Directory holding the encrypted credential files
//! - `TABULA_CACHE_TTL_MS`: Read-cache lifetime of decrypted payloads
//! - `TABULA_EXPIRY_BUFFER_SECS`: Refresh window before token expiry
//! - `TABULA_MAX_REFRESH_ATTEMPTS`: Attempts per refresh sequence
//! - `TABULA_OAUTH_CLIENT_ID`: OAuth public client id
//! - `TABULA_OAUTH_AUTHORIZE_URL`: Authorization endpoint
//! - `TABULA_OAUTH_TOKEN_URL`: Token endpoint
//! - `TABULA_OAUTH_REDIRECT_URI`: Loopback redirect URI
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `$TABULA_CONFIG`
//! 2. `./tabula.toml` or `./tabula.json` (current working directory)
//! 3. `tabula.toml` in the per-user config directory

use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use tabula_domain::constants::CREDENTIALS_DIR_NAME;
use tabula_domain::{AuthConfig, Result, TabulaError};

use crate::errors::InfraError;

/// Config file name probed in the working and config directories.
pub const CONFIG_FILE_NAME: &str = "tabula.toml";

const QUALIFIER: &str = "app";
const ORGANIZATION: &str = "Tabula";
const APPLICATION: &str = "Tabula";

/// Load configuration from every source, in precedence order.
///
/// # Errors
/// Returns `TabulaError::Config` if:
/// - An explicit or probed config file cannot be read or parsed
/// - An environment override has an invalid value
/// - The merged configuration fails validation
pub fn load() -> Result<AuthConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let mut config = match probe_config_paths() {
        Some(path) => load_from_file(&path)?,
        None => {
            tracing::debug!("No config file found, using defaults");
            AuthConfig::default()
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    if config.storage_dir == Path::new(CREDENTIALS_DIR_NAME) {
        if let Some(dir) = default_storage_dir() {
            config.storage_dir = dir;
        }
    }

    config.validate()?;
    tracing::info!(storage_dir = %config.storage_dir.display(), "Configuration loaded");
    Ok(config)
}

/// Load configuration from a file
///
/// Supports both TOML and JSON formats (detected by file extension). Fields
/// missing from the file keep their defaults.
///
/// # Errors
/// Returns `TabulaError::Config` if the file is missing, unreadable, or
/// malformed.
pub fn load_from_file(path: &Path) -> Result<AuthConfig> {
    if !path.exists() {
        return Err(TabulaError::Config(format!("Config file not found: {}", path.display())));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path).map_err(InfraError::from)?;
    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// # Errors
/// Returns `TabulaError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<AuthConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => Ok(toml::from_str(contents).map_err(InfraError::from)?),
        "json" => Ok(serde_json::from_str(contents).map_err(InfraError::from)?),
        _ => Err(TabulaError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Apply `TABULA_*` overrides read through `lookup`.
///
/// `lookup` is normally `std::env::var`; tests pass a map instead so they
/// never touch the process environment.
///
/// # Errors
/// Returns `TabulaError::Config` naming the variable with an invalid value.
pub fn apply_env_overrides<F>(config: &mut AuthConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = var("TABULA_STORAGE_DIR") {
        config.storage_dir = PathBuf::from(dir);
    }
    if let Some(ttl) = var("TABULA_CACHE_TTL_MS") {
        config.cache_ttl_ms = parse_var("TABULA_CACHE_TTL_MS", &ttl)?;
    }
    if let Some(buffer) = var("TABULA_EXPIRY_BUFFER_SECS") {
        config.refresh.expiry_buffer_secs = parse_var("TABULA_EXPIRY_BUFFER_SECS", &buffer)?;
    }
    if let Some(attempts) = var("TABULA_MAX_REFRESH_ATTEMPTS") {
        config.refresh.max_attempts = parse_var("TABULA_MAX_REFRESH_ATTEMPTS", &attempts)?;
    }
    if let Some(client_id) = var("TABULA_OAUTH_CLIENT_ID") {
        config.codex.client_id = client_id;
    }
    if let Some(url) = var("TABULA_OAUTH_AUTHORIZE_URL") {
        config.codex.authorize_url = url;
    }
    if let Some(url) = var("TABULA_OAUTH_TOKEN_URL") {
        config.codex.token_url = url;
    }
    if let Some(uri) = var("TABULA_OAUTH_REDIRECT_URI") {
        config.codex.redirect_uri = uri;
    }
    Ok(())
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TabulaError::Config(format!("Invalid value for {key}: {e}")))
}

/// Probe the standard locations for a config file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(explicit) = std::env::var("TABULA_CONFIG") {
        candidates.push(PathBuf::from(explicit));
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(CONFIG_FILE_NAME));
        candidates.push(cwd.join("tabula.json"));
    }

    if let Some(dirs) = project_dirs() {
        candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Per-user directory for encrypted credential files.
///
/// `None` when no home directory can be determined.
pub fn default_storage_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join(CREDENTIALS_DIR_NAME))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}
