//! MySQL implementation of the SessionRepository trait.
//!
//! JSON payloads and the superseded refresh token chain are stored as text
//! columns. Rotation and in-place updates lock the row with
//! `SELECT ... FOR UPDATE` and apply the change in the same transaction.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Transaction};

use ks_core::domain::entities::{RefreshTokenRotation, SessionPayloadUpdate, SessionRow};
use ks_core::errors::DomainError;
use ks_core::repositories::SessionRepository;

use super::storage_error;

const SESSION_COLUMNS: &str = "session_handle, user_id, recipe_user_id, refresh_token_hash_2, \
     superseded_refresh_token_hash_2s, session_data, jwt_user_payload, grant_payload, \
     anti_csrf_token, created_at_time, expires_at";

/// MySQL implementation of SessionRepository
pub struct MySqlSessionRepository {
    /// Database connection pool
    pool: MySqlPool,
}

impl MySqlSessionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Convert database row to SessionRow entity
    fn row_to_session(row: &MySqlRow) -> Result<SessionRow, DomainError> {
        let column = |name: &'static str| {
            move |e: sqlx::Error| DomainError::Internal {
                message: format!("Failed to get {}: {}", name, e),
            }
        };

        let chain: String = row
            .try_get("superseded_refresh_token_hash_2s")
            .map_err(column("superseded_refresh_token_hash_2s"))?;
        let session_data: String = row
            .try_get("session_data")
            .map_err(column("session_data"))?;
        let jwt_payload: String = row
            .try_get("jwt_user_payload")
            .map_err(column("jwt_user_payload"))?;
        let grant_payload: Option<String> = row
            .try_get("grant_payload")
            .map_err(column("grant_payload"))?;

        Ok(SessionRow {
            handle: row.try_get("session_handle").map_err(column("session_handle"))?,
            user_id: row.try_get("user_id").map_err(column("user_id"))?,
            recipe_user_id: row
                .try_get("recipe_user_id")
                .map_err(column("recipe_user_id"))?,
            current_refresh_token_hash2: row
                .try_get("refresh_token_hash_2")
                .map_err(column("refresh_token_hash_2"))?,
            superseded_refresh_token_hash2s: decode_chain(&chain)?,
            session_data: decode_json("session_data", &session_data)?,
            jwt_payload: decode_json("jwt_user_payload", &jwt_payload)?,
            grant_payload: grant_payload
                .map(|text| decode_json("grant_payload", &text))
                .transpose()?,
            anti_csrf_token: row
                .try_get("anti_csrf_token")
                .map_err(column("anti_csrf_token"))?,
            time_created: row
                .try_get("created_at_time")
                .map_err(column("created_at_time"))?,
            expiry: row.try_get("expires_at").map_err(column("expires_at"))?,
        })
    }

    /// Read and lock a row inside `tx`
    async fn lock_session(
        tx: &mut Transaction<'_, MySql>,
        handle: &str,
    ) -> Result<Option<SessionRow>, DomainError> {
        let query = format!(
            "SELECT {} FROM session_info WHERE session_handle = ? FOR UPDATE",
            SESSION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(handle)
            .fetch_optional(&mut **tx)
            .await
            .map_err(storage_error("lock session"))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    /// Write every mutable column of `session` inside `tx`
    async fn write_session(
        tx: &mut Transaction<'_, MySql>,
        session: &SessionRow,
    ) -> Result<(), DomainError> {
        let query = r#"
            UPDATE session_info
            SET refresh_token_hash_2 = ?,
                superseded_refresh_token_hash_2s = ?,
                session_data = ?,
                jwt_user_payload = ?,
                grant_payload = ?,
                anti_csrf_token = ?,
                expires_at = ?
            WHERE session_handle = ?
        "#;

        sqlx::query(query)
            .bind(&session.current_refresh_token_hash2)
            .bind(encode_json(
                "superseded_refresh_token_hash_2s",
                &session.superseded_refresh_token_hash2s,
            )?)
            .bind(encode_json("session_data", &session.session_data)?)
            .bind(encode_json("jwt_user_payload", &session.jwt_payload)?)
            .bind(
                session
                    .grant_payload
                    .as_ref()
                    .map(|p| encode_json("grant_payload", p))
                    .transpose()?,
            )
            .bind(&session.anti_csrf_token)
            .bind(session.expiry)
            .bind(&session.handle)
            .execute(&mut **tx)
            .await
            .map_err(storage_error("update session"))?;

        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MySqlSessionRepository {
    async fn create_session(&self, session: SessionRow) -> Result<(), DomainError> {
        let query = r#"
            INSERT INTO session_info (
                session_handle, user_id, recipe_user_id, refresh_token_hash_2,
                superseded_refresh_token_hash_2s, session_data, jwt_user_payload,
                grant_payload, anti_csrf_token, created_at_time, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(&session.handle)
            .bind(&session.user_id)
            .bind(&session.recipe_user_id)
            .bind(&session.current_refresh_token_hash2)
            .bind(encode_json(
                "superseded_refresh_token_hash_2s",
                &session.superseded_refresh_token_hash2s,
            )?)
            .bind(encode_json("session_data", &session.session_data)?)
            .bind(encode_json("jwt_user_payload", &session.jwt_payload)?)
            .bind(
                session
                    .grant_payload
                    .as_ref()
                    .map(|p| encode_json("grant_payload", p))
                    .transpose()?,
            )
            .bind(&session.anti_csrf_token)
            .bind(session.time_created)
            .bind(session.expiry)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::Storage {
                    message: format!("Session {} already exists", session.handle),
                },
                _ => storage_error("create session")(e),
            })?;

        Ok(())
    }

    async fn get_session(&self, handle: &str) -> Result<Option<SessionRow>, DomainError> {
        let query = format!(
            "SELECT {} FROM session_info WHERE session_handle = ? LIMIT 1",
            SESSION_COLUMNS
        );

        let result = sqlx::query(&query)
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("find session"))?;

        match result {
            Some(row) => Ok(Some(Self::row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn compare_and_swap_refresh_token(
        &self,
        handle: &str,
        rotation: &RefreshTokenRotation,
    ) -> Result<bool, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_error("begin transaction"))?;

        let Some(mut session) = Self::lock_session(&mut tx, handle).await? else {
            tx.rollback().await.map_err(storage_error("roll back"))?;
            return Ok(false);
        };
        if !session.apply_rotation(rotation) {
            tx.rollback().await.map_err(storage_error("roll back"))?;
            return Ok(false);
        }

        Self::write_session(&mut tx, &session).await?;
        tx.commit()
            .await
            .map_err(storage_error("commit refresh token rotation"))?;
        Ok(true)
    }

    async fn update_session_payloads(
        &self,
        handle: &str,
        update: &SessionPayloadUpdate,
    ) -> Result<bool, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_error("begin transaction"))?;

        let Some(mut session) = Self::lock_session(&mut tx, handle).await? else {
            tx.rollback().await.map_err(storage_error("roll back"))?;
            return Ok(false);
        };
        session.apply_update(update);

        Self::write_session(&mut tx, &session).await?;
        tx.commit()
            .await
            .map_err(storage_error("commit session update"))?;
        Ok(true)
    }

    async fn delete_sessions(&self, handles: &[String]) -> Result<Vec<String>, DomainError> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage_error("begin transaction"))?;

        let rows = handle_list_query(
            "SELECT session_handle FROM session_info WHERE session_handle IN (",
            handles,
            ") FOR UPDATE",
        )
        .build()
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error("find sessions to delete"))?;

        let existing = rows
            .iter()
            .map(|row| row.try_get::<String, _>("session_handle"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_error("read session handle"))?;

        if !existing.is_empty() {
            handle_list_query(
                "DELETE FROM session_info WHERE session_handle IN (",
                &existing,
                ")",
            )
            .build()
            .execute(&mut *tx)
            .await
            .map_err(storage_error("delete sessions"))?;
        }

        tx.commit()
            .await
            .map_err(storage_error("commit session deletion"))?;
        Ok(existing)
    }

    async fn get_session_handles_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, DomainError> {
        let rows = sqlx::query("SELECT session_handle FROM session_info WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("find user sessions"))?;

        rows.iter()
            .map(|row| row.try_get("session_handle"))
            .collect::<Result<Vec<String>, _>>()
            .map_err(storage_error("read session handle"))
    }

    async fn get_non_expired_session_handles_for_user(
        &self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<Vec<String>, DomainError> {
        let rows = sqlx::query(
            "SELECT session_handle FROM session_info WHERE user_id = ? AND expires_at > ?",
        )
        .bind(user_id)
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error("find user sessions"))?;

        rows.iter()
            .map(|row| row.try_get("session_handle"))
            .collect::<Result<Vec<String>, _>>()
            .map_err(storage_error("read session handle"))
    }

    async fn delete_expired_sessions(&self, now_ms: i64) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM session_info WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await
            .map_err(storage_error("delete expired sessions"))?;

        Ok(result.rows_affected())
    }
}

/// `prefix ?, ?, ... suffix` with one bound parameter per handle
fn handle_list_query<'a>(
    prefix: &str,
    handles: &'a [String],
    suffix: &str,
) -> QueryBuilder<'a, MySql> {
    let mut builder = QueryBuilder::new(prefix);
    let mut separated = builder.separated(", ");
    for handle in handles {
        separated.push_bind(handle.as_str());
    }
    separated.push_unseparated(suffix);
    builder
}

fn encode_json<T: Serialize + ?Sized>(column: &str, value: &T) -> Result<String, DomainError> {
    serde_json::to_string(value).map_err(|e| DomainError::Internal {
        message: format!("Failed to encode {}: {}", column, e),
    })
}

fn decode_json(column: &str, text: &str) -> Result<Value, DomainError> {
    serde_json::from_str(text).map_err(|e| DomainError::Internal {
        message: format!("Invalid JSON in {}: {}", column, e),
    })
}

fn decode_chain(text: &str) -> Result<Vec<String>, DomainError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).map_err(|e| DomainError::Internal {
        message: format!("Invalid superseded_refresh_token_hash_2s: {}", e),
    })
}
