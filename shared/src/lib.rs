//! Shared configuration and telemetry for the Keystone session-token core
//!
//! This crate provides the pieces every other crate in the workspace reads:
//! - Session/token configuration consumed by the core services
//! - Database and logging configuration
//! - Tracing subscriber initialisation

pub mod config;
pub mod telemetry;

// Re-export commonly used items at crate root
pub use config::{
    ConfigError, DatabaseConfig, Environment, LogFormat, LoggingConfig, SessionConfig,
};
pub use telemetry::init_tracing;
