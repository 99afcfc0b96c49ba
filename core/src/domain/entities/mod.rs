//! Domain entities representing sessions, tokens and signing keys.

pub mod access_token;
pub mod refresh_token;
pub mod session;
pub mod signing_key;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use access_token::{AccessTokenClaims, AccessTokenFields, AccessTokenVersion, TokenInfo};
pub use refresh_token::{RefreshTokenPayload, RefreshTokenVersion};
pub use session::{
    RefreshTokenRotation, SessionInfo, SessionInformationHolder, SessionPayloadUpdate, SessionRow,
    SessionSummary,
};
pub use signing_key::{LegacySigningKey, SigningKey, SigningKeyKind};
