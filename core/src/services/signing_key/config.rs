//! Configuration for the signing key manager

use ks_shared::SessionConfig;

/// Timing and mode settings for access token signing keys, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyConfig {
    /// How long a dynamic key is used for issuing
    pub update_interval_ms: i64,
    /// Extra verification time after a key stops being used for issuing
    pub overlap_ms: i64,
    /// Longest lifetime of an access token
    pub access_token_validity_ms: i64,
    /// When false, every token is signed with the static key
    pub dynamic_keys_enabled: bool,
}

impl Default for SigningKeyConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SigningKeyConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            update_interval_ms: config.dynamic_signing_key_update_interval_ms(),
            overlap_ms: config.signing_key_overlap_ms(),
            access_token_validity_ms: config.access_token_validity_ms(),
            dynamic_keys_enabled: config.access_token_signing_key_dynamic,
        }
    }
}

impl SigningKeyConfig {
    /// How long after creation a dynamic key may still verify tokens
    pub fn retention_ms(&self) -> i64 {
        self.update_interval_ms.max(self.access_token_validity_ms) + self.overlap_ms
    }
}
