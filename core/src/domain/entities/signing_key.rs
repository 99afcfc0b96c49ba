//! Signing key entities for access token signatures.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between the public and private PEM blocks in `key_material`
pub const KEY_MATERIAL_SEPARATOR: char = '|';

/// Whether a key takes part in rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningKeyKind {
    /// Rotated every update interval, kept for verification during the overlap
    Dynamic,
    /// Never rotated
    Static,
}

impl SigningKeyKind {
    /// Kid prefix (`d` / `s`)
    pub fn kid_prefix(&self) -> &'static str {
        match self {
            SigningKeyKind::Dynamic => "d",
            SigningKeyKind::Static => "s",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningKeyKind::Dynamic => "dynamic",
            SigningKeyKind::Static => "static",
        }
    }

    /// Key kind implied by a kid prefix
    pub fn from_kid(kid: &str) -> Option<Self> {
        match kid.split_once('-') {
            Some(("d", _)) => Some(SigningKeyKind::Dynamic),
            Some(("s", _)) => Some(SigningKeyKind::Static),
            _ => None,
        }
    }
}

impl fmt::Display for SigningKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SigningKeyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic" => Ok(SigningKeyKind::Dynamic),
            "static" => Ok(SigningKeyKind::Static),
            _ => Err(format!("Invalid signing key kind: {}", s)),
        }
    }
}

/// An RSA key pair used to sign access tokens
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Key id, `d-<created_at_time>` or `s-<uuid>`
    pub id: String,
    pub kind: SigningKeyKind,
    /// Creation time in milliseconds since the epoch
    pub created_at_time: i64,
    /// `"<public PEM>|<private PEM>"`
    pub key_material: String,
}

impl SigningKey {
    /// Creates a dynamic key whose id encodes its creation time
    pub fn new_dynamic(created_at_time: i64, key_material: String) -> Self {
        Self {
            id: format!("d-{}", created_at_time),
            kind: SigningKeyKind::Dynamic,
            created_at_time,
            key_material,
        }
    }

    /// Creates a static key with a random id
    pub fn new_static(created_at_time: i64, key_material: String) -> Self {
        Self {
            id: format!("s-{}", Uuid::new_v4()),
            kind: SigningKeyKind::Static,
            created_at_time,
            key_material,
        }
    }

    pub fn public_key_pem(&self) -> Option<&str> {
        self.key_material
            .split_once(KEY_MATERIAL_SEPARATOR)
            .map(|(public, _)| public)
    }

    pub fn private_key_pem(&self) -> Option<&str> {
        self.key_material
            .split_once(KEY_MATERIAL_SEPARATOR)
            .map(|(_, private)| private)
    }

    /// Creation time encoded in a dynamic kid
    pub fn created_at_from_dynamic_kid(kid: &str) -> Option<i64> {
        kid.strip_prefix("d-")?.parse().ok()
    }
}

// Key material is never printed
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("created_at_time", &self.created_at_time)
            .finish_non_exhaustive()
    }
}

/// The singleton key slot used before keys were stored per id
#[derive(Clone, PartialEq, Eq)]
pub struct LegacySigningKey {
    pub key_material: String,
    pub created_at_time: i64,
}

impl fmt::Debug for LegacySigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacySigningKey")
            .field("created_at_time", &self.created_at_time)
            .finish_non_exhaustive()
    }
}
