//! Configuration loading and management
//!
//! This module provides utilities for loading the credential subsystem
//! configuration from files and environment variables.

pub mod loader;

// Re-export commonly used items
pub use loader::{
    apply_env_overrides, default_storage_dir, load, load_from_file, probe_config_paths,
};
