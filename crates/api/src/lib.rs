//! # Tabula App
//!
//! Application layer - commands, context wiring and the `tabula` binary.
//!
//! This crate contains:
//! - Credential commands (shell → credential subsystem bridge)
//! - Application context (dependency injection)
//! - Logging setup and health reporting
//!
//! ## Architecture
//! - Depends on `domain`, `common`, and `infra`
//! - Builds exactly one token manager per process
//! - Commands never panic or surface raw I/O errors

pub mod commands;
pub mod context;
pub mod utils;

// Re-export for convenience
pub use commands::*;
pub use context::AppContext;
