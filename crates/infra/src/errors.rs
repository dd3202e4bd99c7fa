//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use tabula_domain::TabulaError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TabulaError);

impl From<InfraError> for TabulaError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TabulaError> for InfraError {
    fn from(value: TabulaError) -> Self {
        Self(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TabulaError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(err: HttpError) -> Self {
        let mapped = if err.is_builder() {
            TabulaError::Config(format!("invalid HTTP client configuration: {err}"))
        } else if err.is_timeout() {
            TabulaError::Network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            TabulaError::Network(format!("connection failed: {err}"))
        } else {
            TabulaError::Network(err.to_string())
        };
        Self(mapped)
    }
}

/* -------------------------------------------------------------------------- */
/* Config parsing and file I/O → TabulaError */
/* -------------------------------------------------------------------------- */

impl From<std::io::Error> for InfraError {
    fn from(err: std::io::Error) -> Self {
        Self(TabulaError::Config(format!("failed to read config file: {err}")))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(err: toml::de::Error) -> Self {
        Self(TabulaError::Config(format!("Invalid TOML format: {err}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        Self(TabulaError::Config(format!("Invalid JSON format: {err}")))
    }
}
