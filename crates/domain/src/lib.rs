//! # Tabula Domain
//!
//! Credential domain types shared by the Tabula desktop shell.
//!
//! This crate contains:
//! - Provider identifiers and the token value objects handed to callers
//! - The plaintext credential payload persisted per credential domain
//! - Refresh and interactive-connect state types
//! - Domain error types and Result definitions
//! - Configuration structures and their production defaults
//!
//! ## Architecture
//! - No dependencies on other Tabula crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
