//! Configuration for the session service

use ks_shared::SessionConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionServiceConfig {
    /// Check the session store on every verification
    pub access_token_blacklisting: bool,
    /// Superseded refresh token hashes kept per session for theft detection
    pub refresh_token_chain_depth: usize,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionServiceConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            access_token_blacklisting: config.access_token_blacklisting,
            refresh_token_chain_depth: config.refresh_token_chain_depth,
        }
    }
}
