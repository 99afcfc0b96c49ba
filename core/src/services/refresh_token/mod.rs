//! Refresh token module
//!
//! Refresh tokens are opaque to clients: an AES-256-GCM encrypted payload
//! naming the session and the parent token it replaced.

mod config;
mod service;


pub use config::RefreshTokenConfig;
pub use service::{hash, RefreshTokenService};
