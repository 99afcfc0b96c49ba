//! MySQL implementation of the SigningKeyRepository trait.
//!
//! Access token keys live in `session_access_token_signing_keys`. The legacy
//! single-key slot and the refresh token key are rows of `key_value`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use ks_core::domain::entities::{LegacySigningKey, SigningKey, SigningKeyKind};
use ks_core::errors::DomainError;
use ks_core::repositories::SigningKeyRepository;

use super::storage_error;

/// `key_value` name of the pre-rotation access token signing key
const LEGACY_SIGNING_KEY_NAME: &str = "access_token_signing_key";
/// `key_value` name of the refresh token encryption key
const REFRESH_TOKEN_KEY_NAME: &str = "refresh_token_key";

/// MySQL implementation of SigningKeyRepository
pub struct MySqlSigningKeyRepository {
    /// Database connection pool
    pool: MySqlPool,
}

impl MySqlSigningKeyRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_key(row: &MySqlRow) -> Result<SigningKey, DomainError> {
        let column = |name: &'static str| {
            move |e: sqlx::Error| DomainError::Internal {
                message: format!("Failed to get {}: {}", name, e),
            }
        };

        let kind: String = row.try_get("kind").map_err(column("kind"))?;

        Ok(SigningKey {
            id: row.try_get("key_id").map_err(column("key_id"))?,
            kind: kind
                .parse()
                .map_err(|message| DomainError::Internal { message })?,
            created_at_time: row
                .try_get("created_at_time")
                .map_err(column("created_at_time"))?,
            key_material: row
                .try_get("key_material")
                .map_err(column("key_material"))?,
        })
    }
}

#[async_trait]
impl SigningKeyRepository for MySqlSigningKeyRepository {
    async fn get_keys(&self, kind: SigningKeyKind) -> Result<Vec<SigningKey>, DomainError> {
        let query = r#"
            SELECT key_id, kind, created_at_time, key_material
            FROM session_access_token_signing_keys
            WHERE kind = ?
            ORDER BY created_at_time DESC
        "#;

        let rows = sqlx::query(query)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("load signing keys"))?;

        rows.iter().map(Self::row_to_key).collect()
    }

    async fn add_key(&self, key: &SigningKey) -> Result<bool, DomainError> {
        let query = r#"
            INSERT IGNORE INTO session_access_token_signing_keys (
                key_id, kind, created_at_time, key_material
            ) VALUES (?, ?, ?, ?)
        "#;

        let result = sqlx::query(query)
            .bind(&key.id)
            .bind(key.kind.as_str())
            .bind(key.created_at_time)
            .bind(&key.key_material)
            .execute(&self.pool)
            .await
            .map_err(storage_error("store signing key"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_keys_created_before(
        &self,
        kind: SigningKeyKind,
        created_before_ms: i64,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM session_access_token_signing_keys WHERE kind = ? AND created_at_time < ?",
        )
        .bind(kind.as_str())
        .bind(created_before_ms)
        .execute(&self.pool)
        .await
        .map_err(storage_error("delete signing keys"))?;

        Ok(result.rows_affected())
    }

    async fn get_legacy_key(&self) -> Result<Option<LegacySigningKey>, DomainError> {
        let row = sqlx::query("SELECT value, created_at_time FROM key_value WHERE name = ?")
            .bind(LEGACY_SIGNING_KEY_NAME)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("load legacy signing key"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let key_material: Option<String> = row
            .try_get("value")
            .map_err(storage_error("read legacy signing key"))?;
        let created_at_time: i64 = row
            .try_get("created_at_time")
            .map_err(storage_error("read legacy signing key"))?;

        Ok(key_material.map(|key_material| LegacySigningKey {
            key_material,
            created_at_time,
        }))
    }

    async fn remove_legacy_key(&self) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM key_value WHERE name = ?")
            .bind(LEGACY_SIGNING_KEY_NAME)
            .execute(&self.pool)
            .await
            .map_err(storage_error("delete legacy signing key"))?;
        Ok(())
    }

    async fn get_or_create_refresh_token_key(
        &self,
        candidate: &str,
    ) -> Result<String, DomainError> {
        // Concurrent first starts race here; INSERT IGNORE keeps the first writer
        sqlx::query("INSERT IGNORE INTO key_value (name, value, created_at_time) VALUES (?, ?, ?)")
            .bind(REFRESH_TOKEN_KEY_NAME)
            .bind(candidate)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(storage_error("store refresh token key"))?;

        let row = sqlx::query("SELECT value FROM key_value WHERE name = ?")
            .bind(REFRESH_TOKEN_KEY_NAME)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("load refresh token key"))?;

        let value: Option<String> = row
            .try_get("value")
            .map_err(storage_error("read refresh token key"))?;
        value.ok_or_else(|| DomainError::Internal {
            message: "Stored refresh token key is empty".to_string(),
        })
    }
}
