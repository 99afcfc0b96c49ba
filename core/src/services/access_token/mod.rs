//! Access token module
//!
//! This module handles:
//! - Minting V1/V2 (custom signed) and V3 (JWT) access tokens
//! - Locating the signing key by kid, or by trying candidates for older formats
//! - Classifying verification failures as soft (refresh) or hard (unauthorised)

mod jwt;
mod legacy;
mod parsing;
mod service;


pub use jwt::{find_protected_claim, PROTECTED_CLAIMS};
pub use service::{AccessTokenRequest, AccessTokenService, VerifiedAccessToken};
