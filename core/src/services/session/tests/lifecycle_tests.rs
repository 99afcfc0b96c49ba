//! Tests for session creation, verification, update and revocation

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ks_shared::SessionConfig;

use crate::domain::entities::AccessTokenVersion;
use crate::errors::{DomainError, DomainResult, SessionError};
use crate::services::account_linking::AccountLinking;
use crate::services::session::CreateSessionRequest;

use super::Fixture;

fn unauthorized_reason(err: &DomainError) -> Option<&str> {
    match err.as_session_error() {
        Some(SessionError::Unauthorized { reason }) => Some(reason.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn test_create_then_get_session() {
    let fx = Fixture::new();
    let payload = json!({"role": "admin", "tags": [1, 2]});

    let created = fx
        .service
        .create_new_session(
            CreateSessionRequest::new("user-1")
                .with_jwt_payload(payload.clone())
                .with_session_data(json!({"cart": 3})),
        )
        .await
        .unwrap();

    assert!(created.refresh_token.is_some());
    assert!(created.anti_csrf_token.is_none());
    assert_eq!(created.session.recipe_user_id, "user-1");
    assert_eq!(fx.sessions.count().await, 1);

    let access_token = created.access_token.unwrap().token;
    let verified = fx
        .service
        .get_session(&access_token, None, false, true, false)
        .await
        .unwrap();

    assert_eq!(verified.session.handle, created.session.handle);
    assert_eq!(verified.session.user_id, "user-1");
    assert_eq!(verified.session.user_data_in_jwt, payload);
    assert!(verified.access_token.is_none());

    let info = fx
        .service
        .get_session_information(&created.session.handle)
        .await
        .unwrap();
    assert_eq!(info.session_data, json!({"cart": 3}));
    assert_eq!(info.jwt_payload, payload);
}

#[tokio::test]
async fn test_create_session_with_legacy_versions() {
    let fx = Fixture::new();

    for version in [AccessTokenVersion::V1, AccessTokenVersion::V2] {
        let created = fx
            .service
            .create_new_session(
                CreateSessionRequest::new("user-1")
                    .with_version(version)
                    .with_jwt_payload(json!({"sub": "allowed in legacy"})),
            )
            .await
            .unwrap();

        let token = created.access_token.unwrap().token;
        let verified = fx
            .service
            .get_session(&token, None, false, false, false)
            .await
            .unwrap();
        assert_eq!(verified.session.handle, created.session.handle);
    }
}

#[tokio::test]
async fn test_create_session_rejects_bad_payloads() {
    let fx = Fixture::new();

    let err = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1").with_jwt_payload(json!([1])))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BadInput { .. }));

    let err = fx
        .service
        .create_new_session(
            CreateSessionRequest::new("user-1").with_jwt_payload(json!({"sessionHandle": "x"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BadInput { .. }));
    assert_eq!(fx.sessions.count().await, 0);
}

#[tokio::test]
async fn test_expired_access_token_asks_for_refresh() {
    let fx = Fixture::with_config(SessionConfig::default().with_access_token_validity(1));
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let token = created.access_token.unwrap().token;

    fx.clock.advance(1_500);

    let err = fx
        .service
        .get_session(&token, None, false, false, false)
        .await
        .unwrap_err();
    assert!(err.is_try_refresh());
}

#[tokio::test]
async fn test_anti_csrf_mismatch_asks_for_refresh() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1").with_anti_csrf(true))
        .await
        .unwrap();
    let anti_csrf = created.anti_csrf_token.clone().unwrap();
    let token = created.access_token.unwrap().token;

    let err = fx
        .service
        .get_session(&token, Some("wrong"), true, false, false)
        .await
        .unwrap_err();
    assert_eq!(
        err.as_session_error(),
        Some(&SessionError::TryRefreshToken {
            reason: "anti-csrf check failed".to_string()
        })
    );

    let err = fx
        .service
        .get_session(&token, None, true, false, false)
        .await
        .unwrap_err();
    assert!(err.is_try_refresh());

    assert!(fx
        .service
        .get_session(&token, Some(&anti_csrf), true, false, false)
        .await
        .is_ok());
    assert!(fx
        .service
        .get_session(&token, Some("wrong"), false, false, false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_anti_csrf_check_fails_for_token_without_one() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    assert!(created.anti_csrf_token.is_none());
    let token = created.access_token.unwrap().token;

    for supplied in [Some("attacker-chosen"), None] {
        let err = fx
            .service
            .get_session(&token, supplied, true, false, false)
            .await
            .unwrap_err();
        assert_eq!(
            err.as_session_error(),
            Some(&SessionError::TryRefreshToken {
                reason: "anti-csrf check failed".to_string()
            })
        );
    }

    assert!(fx
        .service
        .get_session(&token, Some("attacker-chosen"), false, false, false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_revoked_session_is_only_seen_with_store_check() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let token = created.access_token.unwrap().token;

    assert!(fx
        .service
        .revoke_session_using_handle(&created.session.handle)
        .await
        .unwrap());

    assert!(fx
        .service
        .get_session(&token, None, false, false, false)
        .await
        .is_ok());

    let err = fx
        .service
        .get_session(&token, None, false, true, false)
        .await
        .unwrap_err();
    assert_eq!(unauthorized_reason(&err), Some("Session does not exist."));

    let err = fx
        .service
        .get_session(&token, None, false, false, true)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_blacklisting_config_forces_store_check() {
    let config = SessionConfig {
        access_token_blacklisting: true,
        ..Default::default()
    };
    let fx = Fixture::with_config(config);
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let token = created.access_token.unwrap().token;

    fx.service
        .revoke_session_using_handle(&created.session.handle)
        .await
        .unwrap();

    let err = fx
        .service
        .get_session(&token, None, false, false, false)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_tampered_access_token_is_unauthorized() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let mut token = created.access_token.unwrap().token;
    token.push('x');

    let err = fx
        .service
        .get_session(&token, None, false, false, false)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let err = fx
        .service
        .get_session("not-a-token", None, false, false, false)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_tokens_keep_verifying_across_key_rotation() {
    let config = SessionConfig::default()
        .with_signing_key_update_interval(1)
        .with_access_token_validity(10);
    let fx = Fixture::with_config(config);

    let first = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap()
        .access_token
        .unwrap()
        .token;
    fx.clock.advance(1_500);
    let second = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap()
        .access_token
        .unwrap()
        .token;

    let access_tokens = fx.service.access_tokens();
    let first_claims = access_tokens
        .get_info_from_access_token_without_verifying(&first)
        .unwrap();
    let second_claims = access_tokens
        .get_info_from_access_token_without_verifying(&second)
        .unwrap();
    assert_ne!(first_claims.kid(), second_claims.kid());
    assert_eq!(fx.keys.insert_count(), 2);

    assert!(fx
        .service
        .get_session(&first, None, false, false, false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_static_key_sessions() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1").with_static_key(true))
        .await
        .unwrap();
    let token = created.access_token.unwrap().token;

    let claims = fx
        .service
        .access_tokens()
        .get_info_from_access_token_without_verifying(&token)
        .unwrap();
    assert!(claims.kid().unwrap().starts_with("s-"));

    // Static keys never rotate
    fx.clock.advance(30 * 24 * 3600 * 1000);
    let refreshed = fx
        .service
        .refresh_session(
            &created.refresh_token.unwrap().token,
            None,
            false,
            AccessTokenVersion::V3,
            true,
        )
        .await
        .unwrap();
    let claims = fx
        .service
        .access_tokens()
        .get_info_from_access_token_without_verifying(&refreshed.access_token.unwrap().token)
        .unwrap();
    assert!(claims.kid().unwrap().starts_with("s-"));
    assert_eq!(
        fx.keys
            .all_keys()
            .await
            .iter()
            .filter(|k| k.id.starts_with("s-"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_update_session() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let handle = created.session.handle;

    let err = fx
        .service
        .update_session(&handle, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BadInput { .. }));

    let err = fx
        .service
        .update_session(&handle, None, Some(json!("text")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BadInput { .. }));

    fx.service
        .update_session(
            &handle,
            Some(json!({"step": 2})),
            Some(json!({"role": "viewer"})),
            Some(json!({"scope": "read"})),
        )
        .await
        .unwrap();

    let info = fx.service.get_session_information(&handle).await.unwrap();
    assert_eq!(info.session_data, json!({"step": 2}));
    assert_eq!(info.jwt_payload, json!({"role": "viewer"}));
    assert_eq!(info.grant_payload, Some(json!({"scope": "read"})));
    assert_eq!(info.expiry, created.refresh_token.unwrap().expiry);

    let err = fx
        .service
        .update_session("missing", Some(json!({})), None, None)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_expired_session_is_gone() {
    let fx = Fixture::with_config(SessionConfig::default().with_refresh_token_validity(60));
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();

    fx.clock.advance(60_000);

    let err = fx
        .service
        .get_session_information(&created.session.handle)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert!(fx
        .service
        .get_all_non_expired_session_handles_for_user("user-1", false)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_revoke_session_using_handles() {
    let fx = Fixture::new();

    let revoked = fx
        .service
        .revoke_session_using_handles(&["unknown".to_string()])
        .await
        .unwrap();
    assert!(revoked.is_empty());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let created = fx
            .service
            .create_new_session(CreateSessionRequest::new("user-1"))
            .await
            .unwrap();
        handles.push(created.session.handle);
    }

    let mut to_revoke = handles[..3].to_vec();
    to_revoke.push("unknown".to_string());
    let mut revoked = fx
        .service
        .revoke_session_using_handles(&to_revoke)
        .await
        .unwrap();
    revoked.sort();
    let mut expected = handles[..3].to_vec();
    expected.sort();

    assert_eq!(revoked, expected);
    assert_eq!(fx.sessions.count().await, 2);
}

struct PairedAccounts;

#[async_trait]
impl AccountLinking for PairedAccounts {
    async fn linked_user_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        match user_id {
            "primary" | "secondary" => Ok(vec!["primary".to_string(), "secondary".to_string()]),
            other => Ok(vec![other.to_string()]),
        }
    }
}

#[tokio::test]
async fn test_user_wide_operations_follow_linked_accounts() {
    let fx = Fixture::new();
    let service = fx.service.with_account_linking(Arc::new(PairedAccounts));

    for user in ["primary", "primary", "secondary", "other"] {
        service
            .create_new_session(CreateSessionRequest::new(user))
            .await
            .unwrap();
    }

    let own = service
        .get_all_non_expired_session_handles_for_user("primary", false)
        .await
        .unwrap();
    assert_eq!(own.len(), 2);

    let linked = service
        .get_all_non_expired_session_handles_for_user("primary", true)
        .await
        .unwrap();
    assert_eq!(linked.len(), 3);

    let revoked = service
        .revoke_all_sessions_for_user("secondary", true)
        .await
        .unwrap();
    assert_eq!(revoked.len(), 3);
    assert_eq!(fx.sessions.count().await, 1);

    let revoked = service
        .revoke_all_sessions_for_user("other", false)
        .await
        .unwrap();
    assert_eq!(revoked.len(), 1);
}

struct RepeatingAccounts;

#[async_trait]
impl AccountLinking for RepeatingAccounts {
    async fn linked_user_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        Ok(vec![
            user_id.to_string(),
            "linked".to_string(),
            user_id.to_string(),
        ])
    }
}

#[tokio::test]
async fn test_repeated_linked_accounts_are_listed_once() {
    let fx = Fixture::new();
    let service = fx.service.with_account_linking(Arc::new(RepeatingAccounts));
    let created = service
        .create_new_session(CreateSessionRequest::new("a"))
        .await
        .unwrap();

    let handles = service
        .get_all_non_expired_session_handles_for_user("a", true)
        .await
        .unwrap();
    assert_eq!(handles, vec![created.session.handle.clone()]);

    let revoked = service.revoke_all_sessions_for_user("a", true).await.unwrap();
    assert_eq!(revoked, vec![created.session.handle]);
}
