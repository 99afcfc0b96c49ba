//! Business services containing the session-token logic.

pub mod access_token;
pub mod account_linking;
pub mod clock;
pub mod refresh_token;
pub mod session;
pub mod signing_key;

// Re-export commonly used types
pub use access_token::{AccessTokenRequest, AccessTokenService, VerifiedAccessToken};
pub use account_linking::{AccountLinking, NoAccountLinking};
pub use clock::{Clock, SystemClock};
pub use refresh_token::{RefreshTokenConfig, RefreshTokenService};
pub use session::{
    CleanupResult, CreateSessionRequest, SessionCleanupConfig, SessionCleanupService,
    SessionService, SessionServiceConfig,
};
pub use signing_key::{KeyLookup, SigningKeyConfig, SigningKeyManager};
