//! Platform-specific implementations
//!
//! # Platform Support
//!
//! - **macOS / Windows / Linux**: the system URL handler via the `open` crate
//! - **Headless**: launching fails; the connect flow logs the URL and keeps
//!   waiting for the callback

pub mod browser;

pub use browser::SystemBrowser;
