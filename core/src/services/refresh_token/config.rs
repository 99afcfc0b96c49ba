//! Configuration for the refresh token service

use ks_shared::SessionConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenConfig {
    /// Refresh token lifetime in milliseconds
    pub validity_ms: i64,
    /// `iterations:saltHex:keyHex`; read from the key store when unset
    pub key: Option<String>,
}

impl Default for RefreshTokenConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for RefreshTokenConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            validity_ms: config.refresh_token_validity_ms(),
            key: config.refresh_token_key.clone(),
        }
    }
}
