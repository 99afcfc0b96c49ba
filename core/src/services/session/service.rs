//! Session lifecycle service implementation

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use ks_shared::SessionConfig;

use crate::domain::entities::{
    AccessTokenClaims, AccessTokenVersion, RefreshTokenRotation, SessionInfo,
    SessionInformationHolder, SessionPayloadUpdate, SessionRow, SessionSummary,
};
use crate::errors::{DomainError, DomainResult, SessionError, TokenError};
use crate::repositories::{SessionRepository, SigningKeyRepository};
use crate::services::access_token::{find_protected_claim, AccessTokenRequest, AccessTokenService};
use crate::services::account_linking::{AccountLinking, NoAccountLinking};
use crate::services::clock::Clock;
use crate::services::refresh_token::{hash, RefreshTokenConfig, RefreshTokenService};
use crate::services::signing_key::{SigningKeyConfig, SigningKeyManager};

use super::config::SessionServiceConfig;

const SESSION_DOES_NOT_EXIST: &str = "Session does not exist.";

/// Parameters of a new session
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub user_id: String,
    /// Defaults to `user_id`
    pub recipe_user_id: Option<String>,
    /// Embedded in every access token of the session; must be a JSON object
    pub jwt_payload: Value,
    /// Server-side only data
    pub session_data: Value,
    pub enable_anti_csrf: bool,
    pub version: AccessTokenVersion,
    pub use_static_key: bool,
}

impl CreateSessionRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            recipe_user_id: None,
            jwt_payload: Value::Object(Map::new()),
            session_data: Value::Object(Map::new()),
            enable_anti_csrf: false,
            version: AccessTokenVersion::LATEST,
            use_static_key: false,
        }
    }

    pub fn with_recipe_user_id(mut self, recipe_user_id: impl Into<String>) -> Self {
        self.recipe_user_id = Some(recipe_user_id.into());
        self
    }

    pub fn with_jwt_payload(mut self, payload: Value) -> Self {
        self.jwt_payload = payload;
        self
    }

    pub fn with_session_data(mut self, data: Value) -> Self {
        self.session_data = data;
        self
    }

    pub fn with_anti_csrf(mut self, enabled: bool) -> Self {
        self.enable_anti_csrf = enabled;
        self
    }

    pub fn with_version(mut self, version: AccessTokenVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_static_key(mut self, use_static_key: bool) -> Self {
        self.use_static_key = use_static_key;
        self
    }
}

/// Session lifecycle service
///
/// Creates, verifies, refreshes, regenerates and revokes sessions. Token
/// codec failures are classified into [`SessionError`] before they reach
/// the caller.
pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    access_tokens: Arc<AccessTokenService>,
    refresh_tokens: Arc<RefreshTokenService>,
    account_linking: Arc<dyn AccountLinking>,
    clock: Arc<dyn Clock>,
    config: SessionServiceConfig,
}

impl SessionService {
    /// Creates a new session service from its collaborators
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        access_tokens: Arc<AccessTokenService>,
        refresh_tokens: Arc<RefreshTokenService>,
        clock: Arc<dyn Clock>,
        config: SessionServiceConfig,
    ) -> Self {
        Self {
            repository,
            access_tokens,
            refresh_tokens,
            account_linking: Arc::new(NoAccountLinking),
            clock,
            config,
        }
    }

    /// Wires the whole token stack from one [`SessionConfig`]
    ///
    /// # Returns
    ///
    /// * `Err(DomainError::BadInput)` - The configuration is invalid
    pub fn build(
        session_repository: Arc<dyn SessionRepository>,
        key_repository: Arc<dyn SigningKeyRepository>,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
    ) -> DomainResult<Self> {
        config
            .validate()
            .map_err(|e| DomainError::bad_input(e.to_string()))?;

        let key_manager = Arc::new(SigningKeyManager::new(
            Arc::clone(&key_repository),
            Arc::clone(&clock),
            SigningKeyConfig::from(config),
        ));
        let access_tokens = Arc::new(AccessTokenService::new(
            key_manager,
            Arc::clone(&clock),
            config.access_token_validity_ms(),
        ));
        let refresh_tokens = Arc::new(RefreshTokenService::new(
            key_repository,
            Arc::clone(&clock),
            RefreshTokenConfig::from(config),
        ));

        Ok(Self::new(
            session_repository,
            access_tokens,
            refresh_tokens,
            clock,
            SessionServiceConfig::from(config),
        ))
    }

    /// Replaces the account linking collaborator
    pub fn with_account_linking(mut self, account_linking: Arc<dyn AccountLinking>) -> Self {
        self.account_linking = account_linking;
        self
    }

    /// Migrates the legacy signing key and loads the key set
    pub async fn initialize(&self) -> DomainResult<()> {
        self.access_tokens.key_manager().initialize().await
    }

    pub fn access_tokens(&self) -> &Arc<AccessTokenService> {
        &self.access_tokens
    }

    pub fn refresh_tokens(&self) -> &Arc<RefreshTokenService> {
        &self.refresh_tokens
    }

    pub fn key_manager(&self) -> &Arc<SigningKeyManager> {
        self.access_tokens.key_manager()
    }

    /// Creates a session and its first token pair
    ///
    /// # Returns
    ///
    /// * `Ok(SessionInformationHolder)` - Session with access and refresh tokens
    /// * `Err(DomainError::BadInput)` - The JWT payload is not an object or uses a protected claim
    pub async fn create_new_session(
        &self,
        request: CreateSessionRequest,
    ) -> DomainResult<SessionInformationHolder> {
        let user_payload = object_payload(&request.jwt_payload)?;

        let handle = Uuid::new_v4().to_string();
        let recipe_user_id = request
            .recipe_user_id
            .unwrap_or_else(|| request.user_id.clone());
        let anti_csrf_token = request.enable_anti_csrf.then(new_anti_csrf_token);

        let refresh_token = self
            .refresh_tokens
            .create_new_refresh_token(&handle, &request.user_id, None, anti_csrf_token.clone())
            .await?;
        let refresh_token_hash1 = hash(&refresh_token.token);

        let access_token = self
            .access_tokens
            .create_new_access_token(AccessTokenRequest {
                session_handle: handle.clone(),
                user_id: request.user_id.clone(),
                recipe_user_id: Some(recipe_user_id.clone()),
                refresh_token_hash1: refresh_token_hash1.clone(),
                parent_refresh_token_hash1: None,
                user_payload,
                anti_csrf_token: anti_csrf_token.clone(),
                last_manual_refresh_time: None,
                explicit_expiry: None,
                version: request.version,
                key_kind: self.key_manager().issuing_kind(request.use_static_key),
            })
            .await?;

        self.repository
            .create_session(SessionRow {
                handle: handle.clone(),
                user_id: request.user_id.clone(),
                recipe_user_id: recipe_user_id.clone(),
                current_refresh_token_hash2: hash(&refresh_token_hash1),
                superseded_refresh_token_hash2s: Vec::new(),
                session_data: request.session_data,
                jwt_payload: request.jwt_payload.clone(),
                grant_payload: None,
                anti_csrf_token: anti_csrf_token.clone(),
                time_created: access_token.created_time,
                expiry: refresh_token.expiry,
            })
            .await?;

        info!(session_handle = %handle, user_id = %request.user_id, "Created session");

        Ok(SessionInformationHolder {
            session: SessionSummary {
                handle,
                user_id: request.user_id,
                recipe_user_id,
                user_data_in_jwt: request.jwt_payload,
                expiry_time: access_token.expiry,
            },
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            anti_csrf_token,
        })
    }

    /// Verifies an access token and returns the session it belongs to
    ///
    /// # Arguments
    ///
    /// * `access_token` - The presented access token
    /// * `anti_csrf_token` - The anti-CSRF token sent alongside it
    /// * `do_anti_csrf_check` - Compare `anti_csrf_token` with the one embedded in the token
    /// * `check_against_store` - Confirm the session row still exists
    /// * `use_blacklisting` - Same as `check_against_store`; kept for callers that name it so
    ///
    /// # Returns
    ///
    /// * `Ok(SessionInformationHolder)` - No new tokens are minted
    /// * `Err(SessionError::TryRefreshToken)` - Expired, stale key, incomplete claims or anti-CSRF mismatch
    /// * `Err(SessionError::Unauthorized)` - Bad signature, malformed token or revoked session
    pub async fn get_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
        check_against_store: bool,
        use_blacklisting: bool,
    ) -> DomainResult<SessionInformationHolder> {
        let claims = match self
            .access_tokens
            .get_info_from_access_token(access_token, do_anti_csrf_check)
            .await
        {
            Ok(claims) => claims,
            Err(DomainError::Token(TokenError::MissingAntiCsrf)) => {
                debug!("Access token carries no anti-CSRF token");
                return Err(DomainError::try_refresh("anti-csrf check failed"));
            }
            Err(e) => return Err(classify(e)),
        };
        let fields = claims.fields();

        if do_anti_csrf_check && anti_csrf_token != fields.anti_csrf_token.as_deref() {
            debug!(session_handle = %fields.session_handle, "Anti-CSRF token mismatch");
            return Err(DomainError::try_refresh("anti-csrf check failed"));
        }

        if check_against_store || use_blacklisting || self.config.access_token_blacklisting {
            self.live_row(&fields.session_handle).await?;
        }

        Ok(SessionInformationHolder {
            session: summary_from_claims(&claims),
            access_token: None,
            refresh_token: None,
            anti_csrf_token: None,
        })
    }

    /// Exchanges a refresh token for a new token pair
    ///
    /// The row is rotated eagerly with a compare-and-swap. Presenting a
    /// refresh token the session has already rotated away from revokes the
    /// session.
    ///
    /// # Returns
    ///
    /// * `Ok(SessionInformationHolder)` - New access and refresh tokens
    /// * `Err(SessionError::Unauthorized)` - Undecryptable token, anti-CSRF mismatch,
    ///   unknown session or lost race
    /// * `Err(SessionError::TokenTheftDetected)` - A superseded token was replayed
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
        version: AccessTokenVersion,
        use_static_key: bool,
    ) -> DomainResult<SessionInformationHolder> {
        let payload = self
            .refresh_tokens
            .get_info_from_refresh_token(refresh_token)
            .await?;

        if enable_anti_csrf {
            if let Some(expected) = payload.anti_csrf_token.as_deref() {
                if anti_csrf_token != Some(expected) {
                    return Err(DomainError::unauthorized(
                        "Anti CSRF token missing, or not matching",
                    ));
                }
            }
        }

        let row = self.live_row(&payload.session_handle).await?;
        if row.user_id != payload.user_id {
            return Err(DomainError::unauthorized(
                "Refresh token does not belong to this session",
            ));
        }

        let refresh_token_hash1 = hash(refresh_token);
        let refresh_token_hash2 = hash(&refresh_token_hash1);

        if row.is_superseded(&refresh_token_hash2) {
            self.repository
                .delete_sessions(std::slice::from_ref(&row.handle))
                .await?;
            warn!(
                session_handle = %row.handle,
                user_id = %row.user_id,
                "Refresh token reuse detected, session revoked"
            );
            return Err(SessionError::TokenTheftDetected {
                session_handle: row.handle,
                user_id: row.user_id,
            }
            .into());
        }

        if row.current_refresh_token_hash2 != refresh_token_hash2 {
            return Err(DomainError::unauthorized(
                "Refresh token is not valid for this session",
            ));
        }

        let new_anti_csrf_token = enable_anti_csrf.then(new_anti_csrf_token);
        let new_refresh_token = self
            .refresh_tokens
            .create_new_refresh_token(
                &row.handle,
                &row.user_id,
                Some(refresh_token_hash1.clone()),
                new_anti_csrf_token.clone(),
            )
            .await?;
        let new_refresh_token_hash1 = hash(&new_refresh_token.token);

        let rotation = RefreshTokenRotation {
            expected_hash2: refresh_token_hash2,
            new_hash2: hash(&new_refresh_token_hash1),
            new_expiry: new_refresh_token.expiry,
            new_anti_csrf_token: new_anti_csrf_token.clone(),
            chain_depth: self.config.refresh_token_chain_depth,
        };
        if !self
            .repository
            .compare_and_swap_refresh_token(&row.handle, &rotation)
            .await?
        {
            debug!(session_handle = %row.handle, "Lost refresh rotation race");
            return Err(DomainError::unauthorized(
                "refresh token was rotated concurrently",
            ));
        }

        let access_token = self
            .access_tokens
            .create_new_access_token(AccessTokenRequest {
                session_handle: row.handle.clone(),
                user_id: row.user_id.clone(),
                recipe_user_id: Some(row.recipe_user_id.clone()),
                refresh_token_hash1: new_refresh_token_hash1,
                parent_refresh_token_hash1: Some(refresh_token_hash1),
                user_payload: row.jwt_payload.as_object().cloned().unwrap_or_default(),
                anti_csrf_token: new_anti_csrf_token.clone(),
                last_manual_refresh_time: None,
                explicit_expiry: None,
                version,
                key_kind: self.key_manager().issuing_kind(use_static_key),
            })
            .await?;

        debug!(session_handle = %row.handle, "Refreshed session");

        Ok(SessionInformationHolder {
            session: SessionSummary {
                handle: row.handle,
                user_id: row.user_id,
                recipe_user_id: row.recipe_user_id,
                user_data_in_jwt: row.jwt_payload,
                expiry_time: access_token.expiry,
            },
            access_token: Some(access_token),
            refresh_token: Some(new_refresh_token),
            anti_csrf_token: new_anti_csrf_token,
        })
    }

    /// Replaces the payloads of a session and, if the presented token is
    /// still valid, mints a replacement with the same expiry
    ///
    /// # Arguments
    ///
    /// * `access_token` - A token of the session; may be expired
    /// * `new_jwt_payload` - Replaces the JWT payload when set
    /// * `new_grant_payload` - Replaces the grant payload when set
    /// * `allow_anti_csrf_upgrade` - Mint an anti-CSRF token if the presented token has none
    ///
    /// # Returns
    ///
    /// * `Ok(holder)` - `holder.access_token` is `None` when the presented token had expired
    /// * `Err(SessionError::Unauthorized)` - The token cannot be verified or the session is gone
    pub async fn regenerate_token(
        &self,
        access_token: &str,
        new_jwt_payload: Option<Value>,
        new_grant_payload: Option<Value>,
        allow_anti_csrf_upgrade: bool,
    ) -> DomainResult<SessionInformationHolder> {
        let verified = self
            .access_tokens
            .verify_signature_allowing_expired(access_token)
            .await
            .map_err(|e| match e {
                DomainError::Token(e) => DomainError::unauthorized(e.to_string()),
                other => other,
            })?;
        let fields = verified.claims.fields();

        let new_user_payload = new_jwt_payload.as_ref().map(object_payload).transpose()?;
        if verified.claims.version() == AccessTokenVersion::V3 {
            if let Some(claim) = new_user_payload.as_ref().and_then(find_protected_claim) {
                return Err(DomainError::bad_input(format!(
                    "The user payload contains protected field: {}",
                    claim
                )));
            }
        }
        let row = self.live_row(&fields.session_handle).await?;

        let now = self.clock.now_millis();
        let expired = fields.is_expired(now);
        let upgraded_anti_csrf_token = (allow_anti_csrf_upgrade
            && !expired
            && fields.anti_csrf_token.is_none())
        .then(new_anti_csrf_token);

        let update = SessionPayloadUpdate {
            session_data: None,
            jwt_payload: new_jwt_payload.clone(),
            grant_payload: new_grant_payload,
            anti_csrf_token: upgraded_anti_csrf_token.clone(),
        };
        if !update.is_empty()
            && !self
                .repository
                .update_session_payloads(&row.handle, &update)
                .await?
        {
            return Err(DomainError::unauthorized(SESSION_DOES_NOT_EXIST));
        }

        let user_payload = new_user_payload.unwrap_or_else(|| fields.user_payload.clone());
        let mut session = summary_from_claims(&verified.claims);
        session.user_data_in_jwt = Value::Object(user_payload.clone());

        if expired {
            debug!(session_handle = %row.handle, "Regenerated payload of an expired access token");
            return Ok(SessionInformationHolder {
                session,
                access_token: None,
                refresh_token: None,
                anti_csrf_token: None,
            });
        }

        let anti_csrf_token = upgraded_anti_csrf_token
            .clone()
            .or_else(|| fields.anti_csrf_token.clone());
        let new_access_token = self
            .access_tokens
            .create_new_access_token(AccessTokenRequest {
                session_handle: fields.session_handle.clone(),
                user_id: fields.user_id.clone(),
                recipe_user_id: fields.recipe_user_id.clone(),
                refresh_token_hash1: fields.refresh_token_hash1.clone(),
                parent_refresh_token_hash1: fields.parent_refresh_token_hash1.clone(),
                user_payload,
                anti_csrf_token,
                last_manual_refresh_time: Some(now),
                explicit_expiry: Some(fields.expiry_time),
                version: verified.claims.version(),
                key_kind: verified.key_kind,
            })
            .await?;

        session.expiry_time = new_access_token.expiry;
        Ok(SessionInformationHolder {
            session,
            access_token: Some(new_access_token),
            refresh_token: None,
            anti_csrf_token: upgraded_anti_csrf_token,
        })
    }

    /// Updates stored payloads in place. Expiry and tokens are untouched.
    ///
    /// # Returns
    ///
    /// * `Err(DomainError::BadInput)` - Nothing to update, or the JWT payload is not an object
    /// * `Err(SessionError::Unauthorized)` - No live session with this handle
    pub async fn update_session(
        &self,
        session_handle: &str,
        session_data: Option<Value>,
        jwt_payload: Option<Value>,
        grant_payload: Option<Value>,
    ) -> DomainResult<()> {
        let update = SessionPayloadUpdate {
            session_data,
            jwt_payload,
            grant_payload,
            anti_csrf_token: None,
        };
        if update.is_empty() {
            return Err(DomainError::bad_input("Nothing to update"));
        }
        if let Some(jwt_payload) = &update.jwt_payload {
            object_payload(jwt_payload)?;
        }

        self.live_row(session_handle).await?;
        if !self
            .repository
            .update_session_payloads(session_handle, &update)
            .await?
        {
            return Err(DomainError::unauthorized(SESSION_DOES_NOT_EXIST));
        }
        Ok(())
    }

    /// Stored data of a live session
    pub async fn get_session_information(&self, session_handle: &str) -> DomainResult<SessionInfo> {
        Ok(self.live_row(session_handle).await?.into())
    }

    /// Deletes the given sessions
    ///
    /// # Returns
    ///
    /// The handles that existed and were deleted; unknown handles are ignored
    pub async fn revoke_session_using_handles(
        &self,
        session_handles: &[String],
    ) -> DomainResult<Vec<String>> {
        if session_handles.is_empty() {
            return Ok(Vec::new());
        }

        let revoked = self.repository.delete_sessions(session_handles).await?;
        if !revoked.is_empty() {
            info!(count = revoked.len(), "Revoked sessions");
        }
        Ok(revoked)
    }

    pub async fn revoke_session_using_handle(&self, session_handle: &str) -> DomainResult<bool> {
        let revoked = self
            .revoke_session_using_handles(&[session_handle.to_string()])
            .await?;
        Ok(!revoked.is_empty())
    }

    /// Deletes every session of a user, and of the users linked to it when asked
    pub async fn revoke_all_sessions_for_user(
        &self,
        user_id: &str,
        include_linked_accounts: bool,
    ) -> DomainResult<Vec<String>> {
        let mut handles = Vec::new();
        for user_id in self.user_ids(user_id, include_linked_accounts).await? {
            handles.extend(self.repository.get_session_handles_for_user(&user_id).await?);
        }
        self.revoke_session_using_handles(&handles).await
    }

    /// Handles of the live sessions of a user, and of linked users when asked
    pub async fn get_all_non_expired_session_handles_for_user(
        &self,
        user_id: &str,
        include_linked_accounts: bool,
    ) -> DomainResult<Vec<String>> {
        let now = self.clock.now_millis();
        let mut handles = Vec::new();
        for user_id in self.user_ids(user_id, include_linked_accounts).await? {
            handles.extend(
                self.repository
                    .get_non_expired_session_handles_for_user(&user_id, now)
                    .await?,
            );
        }
        Ok(handles)
    }

    async fn user_ids(&self, user_id: &str, include_linked_accounts: bool) -> DomainResult<Vec<String>> {
        if !include_linked_accounts {
            return Ok(vec![user_id.to_string()]);
        }

        let mut user_ids = self.account_linking.linked_user_ids(user_id).await?;
        if !user_ids.iter().any(|id| id == user_id) {
            user_ids.push(user_id.to_string());
        }
        user_ids.sort();
        user_ids.dedup();
        Ok(user_ids)
    }

    async fn live_row(&self, session_handle: &str) -> DomainResult<SessionRow> {
        let now = self.clock.now_millis();
        self.repository
            .get_session(session_handle)
            .await?
            .filter(|row| !row.is_expired(now))
            .ok_or_else(|| DomainError::unauthorized(SESSION_DOES_NOT_EXIST))
    }
}

fn new_anti_csrf_token() -> String {
    Uuid::new_v4().to_string()
}

fn object_payload(payload: &Value) -> DomainResult<Map<String, Value>> {
    payload
        .as_object()
        .cloned()
        .ok_or_else(|| DomainError::bad_input("The JWT payload must be a JSON object"))
}

/// Token codec failures become session outcomes
fn classify(error: DomainError) -> DomainError {
    match error {
        DomainError::Token(e) => SessionError::from(e).into(),
        other => other,
    }
}

fn summary_from_claims(claims: &AccessTokenClaims) -> SessionSummary {
    let fields = claims.fields();
    SessionSummary {
        handle: fields.session_handle.clone(),
        user_id: fields.user_id.clone(),
        recipe_user_id: fields.effective_recipe_user_id().to_string(),
        user_data_in_jwt: Value::Object(fields.user_payload.clone()),
        expiry_time: fields.expiry_time,
    }
}
