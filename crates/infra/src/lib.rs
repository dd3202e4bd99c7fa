//! # Tabula Infrastructure
//!
//! Process-level adapters for the credential subsystem.
//!
//! This crate contains:
//! - Configuration loading (TOML file, `.env`, `TABULA_*` environment)
//! - The shared HTTP client used for token endpoint calls
//! - Platform integration (opening the system browser)
//!
//! ## Architecture
//! - Implements seams defined in `tabula-common` (e.g. `BrowserOpener`)
//! - Depends on `tabula-domain` and `tabula-common`
//! - Contains the "impure" code that touches the environment

pub mod config;
pub mod errors;
pub mod http;
pub mod platform;

// Re-export commonly used items
pub use config::{load, load_from_file};
pub use errors::InfraError;
pub use http::HttpClientBuilder;
pub use platform::SystemBrowser;
