//! Commands - shell to credential subsystem bridge

mod auth;

pub use auth::*;
