//! Retry timing for the refresh path.

pub mod backoff;

pub use backoff::{jitter, jitter_offset_ms, RefreshBackoff};
