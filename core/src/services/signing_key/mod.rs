//! Signing key module for access tokens
//!
//! This module handles:
//! - RSA key pair generation and parsing
//! - Dynamic key rotation with an overlap window for verification
//! - Static keys that never rotate
//! - Migration of the legacy single-key slot
//! - Removal of expired dynamic keys

mod config;
mod keys;
mod manager;


pub use config::SigningKeyConfig;
pub use keys::{generate_key_material, KeySnapshot, LoadedSigningKey};
pub use manager::{KeyLookup, SigningKeyManager, VerificationCandidates};
