//! Session lifecycle: create, verify, refresh, regenerate, update and revoke.

mod cleanup;
mod config;
mod service;

#[cfg(test)]
mod tests;

pub use cleanup::{CleanupResult, SessionCleanupConfig, SessionCleanupService};
pub use config::SessionServiceConfig;
pub use service::{CreateSessionRequest, SessionService};
