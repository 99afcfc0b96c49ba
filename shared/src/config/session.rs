//! Session and token configuration
//!
//! All durations are expressed in seconds. Accessors ending in `_ms` return
//! the same values in milliseconds, which is the unit the token formats use.

use serde::{Deserialize, Serialize};

use super::{env_opt, env_or, ConfigError};

/// Configuration consumed by the session-token core
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_validity")]
    pub access_token_validity: u64,

    /// Refresh token (and session row) lifetime in seconds
    #[serde(default = "default_refresh_token_validity")]
    pub refresh_token_validity: u64,

    /// Legacy name for the dynamic key update interval, in seconds.
    /// Only consulted when `access_token_dynamic_signing_key_update_interval` is unset.
    #[serde(default)]
    pub access_token_signing_key_update_interval: Option<u64>,

    /// How long a dynamic signing key is used for issuing, in seconds
    #[serde(default)]
    pub access_token_dynamic_signing_key_update_interval: Option<u64>,

    /// Extra time a superseded dynamic key stays valid for verification, in seconds
    #[serde(default = "default_signing_key_overlap")]
    pub access_token_signing_key_overlap: u64,

    /// When false, access tokens are always signed with the static key
    #[serde(default = "default_true")]
    pub access_token_signing_key_dynamic: bool,

    /// Force a session store lookup on every verification
    #[serde(default)]
    pub access_token_blacklisting: bool,

    /// Refresh token encryption key (`iterations:saltHex:keyHex`).
    /// When unset the key is created once and kept in the key store.
    #[serde(default)]
    pub refresh_token_key: Option<String>,

    /// Number of superseded refresh token hashes remembered per session
    #[serde(default = "default_refresh_token_chain_depth")]
    pub refresh_token_chain_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_token_validity: default_access_token_validity(),
            refresh_token_validity: default_refresh_token_validity(),
            access_token_signing_key_update_interval: None,
            access_token_dynamic_signing_key_update_interval: None,
            access_token_signing_key_overlap: default_signing_key_overlap(),
            access_token_signing_key_dynamic: true,
            access_token_blacklisting: false,
            refresh_token_key: None,
            refresh_token_chain_depth: default_refresh_token_chain_depth(),
        }
    }
}

impl SessionConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            access_token_validity: env_or("ACCESS_TOKEN_VALIDITY", defaults.access_token_validity),
            refresh_token_validity: env_or("REFRESH_TOKEN_VALIDITY", defaults.refresh_token_validity),
            access_token_signing_key_update_interval: env_opt(
                "ACCESS_TOKEN_SIGNING_KEY_UPDATE_INTERVAL",
            ),
            access_token_dynamic_signing_key_update_interval: env_opt(
                "ACCESS_TOKEN_DYNAMIC_SIGNING_KEY_UPDATE_INTERVAL",
            ),
            access_token_signing_key_overlap: env_or(
                "ACCESS_TOKEN_SIGNING_KEY_OVERLAP",
                defaults.access_token_signing_key_overlap,
            ),
            access_token_signing_key_dynamic: env_or(
                "ACCESS_TOKEN_SIGNING_KEY_DYNAMIC",
                defaults.access_token_signing_key_dynamic,
            ),
            access_token_blacklisting: env_or(
                "ACCESS_TOKEN_BLACKLISTING",
                defaults.access_token_blacklisting,
            ),
            refresh_token_key: std::env::var("REFRESH_TOKEN_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            refresh_token_chain_depth: env_or(
                "REFRESH_TOKEN_CHAIN_DEPTH",
                defaults.refresh_token_chain_depth,
            ),
        }
    }

    /// Set access token validity in seconds
    pub fn with_access_token_validity(mut self, seconds: u64) -> Self {
        self.access_token_validity = seconds;
        self
    }

    /// Set refresh token validity in seconds
    pub fn with_refresh_token_validity(mut self, seconds: u64) -> Self {
        self.refresh_token_validity = seconds;
        self
    }

    /// Set the dynamic signing key update interval in seconds
    pub fn with_signing_key_update_interval(mut self, seconds: u64) -> Self {
        self.access_token_dynamic_signing_key_update_interval = Some(seconds);
        self
    }

    /// Checks that every duration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("access_token_validity", self.access_token_validity),
            ("refresh_token_validity", self.refresh_token_validity),
            (
                "access_token_dynamic_signing_key_update_interval",
                self.dynamic_signing_key_update_interval(),
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.refresh_token_chain_depth < 2 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_token_chain_depth".to_string(),
                reason: "must remember at least the parent and grandparent".to_string(),
            });
        }

        if let Some(key) = &self.refresh_token_key {
            if key.split(':').count() != 3 {
                return Err(ConfigError::InvalidValue {
                    field: "refresh_token_key".to_string(),
                    reason: "expected iterations:saltHex:keyHex".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Resolved dynamic key update interval in seconds
    pub fn dynamic_signing_key_update_interval(&self) -> u64 {
        self.access_token_dynamic_signing_key_update_interval
            .or(self.access_token_signing_key_update_interval)
            .unwrap_or_else(default_dynamic_signing_key_update_interval)
    }

    pub fn access_token_validity_ms(&self) -> i64 {
        secs_to_ms(self.access_token_validity)
    }

    pub fn refresh_token_validity_ms(&self) -> i64 {
        secs_to_ms(self.refresh_token_validity)
    }

    pub fn dynamic_signing_key_update_interval_ms(&self) -> i64 {
        secs_to_ms(self.dynamic_signing_key_update_interval())
    }

    /// Overlap window in milliseconds.
    ///
    /// An overlap longer than the update interval would keep every key
    /// "fresh" forever, so short intervals use a fifth of the interval instead.
    pub fn signing_key_overlap_ms(&self) -> i64 {
        let interval = self.dynamic_signing_key_update_interval_ms();
        let overlap = secs_to_ms(self.access_token_signing_key_overlap);
        if interval < overlap {
            interval / 5
        } else {
            overlap
        }
    }

    /// How long a dynamic key stays valid for verification after creation
    pub fn dynamic_signing_key_retention_ms(&self) -> i64 {
        self.dynamic_signing_key_update_interval_ms()
            .max(self.access_token_validity_ms())
            + self.signing_key_overlap_ms()
    }
}

fn secs_to_ms(seconds: u64) -> i64 {
    i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn default_access_token_validity() -> u64 {
    3600 // 1 hour
}

fn default_refresh_token_validity() -> u64 {
    8_640_000 // 100 days
}

fn default_dynamic_signing_key_update_interval() -> u64 {
    604_800 // 7 days
}

fn default_signing_key_overlap() -> u64 {
    60
}

fn default_refresh_token_chain_depth() -> usize {
    32
}

fn default_true() -> bool {
    true
}
