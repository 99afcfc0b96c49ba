//! Tests for refresh token rotation and theft detection

use std::sync::Arc;

use ks_shared::SessionConfig;

use crate::domain::entities::{AccessTokenVersion, SessionInformationHolder};
use crate::errors::SessionError;
use crate::repositories::SessionRepository;
use crate::services::refresh_token::hash;
use crate::services::session::CreateSessionRequest;

use super::Fixture;

fn refresh_token_of(holder: &SessionInformationHolder) -> String {
    holder.refresh_token.as_ref().unwrap().token.clone()
}

fn access_token_of(holder: &SessionInformationHolder) -> String {
    holder.access_token.as_ref().unwrap().token.clone()
}

#[tokio::test]
async fn test_refresh_after_access_token_expiry() {
    let fx = Fixture::with_config(SessionConfig::default().with_access_token_validity(1));
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();

    fx.clock.advance(1_500);
    let err = fx
        .service
        .get_session(&access_token_of(&created), None, false, false, false)
        .await
        .unwrap_err();
    assert!(err.is_try_refresh());

    let refreshed = fx
        .service
        .refresh_session(
            &refresh_token_of(&created),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap();

    assert_eq!(refreshed.session.handle, created.session.handle);
    assert_ne!(access_token_of(&refreshed), access_token_of(&created));
    assert_ne!(refresh_token_of(&refreshed), refresh_token_of(&created));

    let verified = fx
        .service
        .get_session(&access_token_of(&refreshed), None, false, true, false)
        .await
        .unwrap();
    assert_eq!(verified.session.handle, created.session.handle);
}

#[tokio::test]
async fn test_refresh_rotates_row_and_extends_expiry() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let before = fx
        .sessions
        .get_session(&created.session.handle)
        .await
        .unwrap()
        .unwrap();

    fx.clock.advance(60_000);
    let refreshed = fx
        .service
        .refresh_session(
            &refresh_token_of(&created),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap();

    let after = fx
        .sessions
        .get_session(&created.session.handle)
        .await
        .unwrap()
        .unwrap();
    let old_hash2 = hash(&hash(&refresh_token_of(&created)));
    let new_hash2 = hash(&hash(&refresh_token_of(&refreshed)));

    assert_eq!(before.current_refresh_token_hash2, old_hash2);
    assert_eq!(after.current_refresh_token_hash2, new_hash2);
    assert_eq!(after.superseded_refresh_token_hash2s, vec![old_hash2]);
    assert_eq!(after.expiry, before.expiry + 60_000);
    assert_eq!(after.time_created, before.time_created);

    let claims = fx
        .service
        .access_tokens()
        .get_info_from_access_token(&access_token_of(&refreshed), false)
        .await
        .unwrap();
    assert_eq!(
        claims.fields().parent_refresh_token_hash1.as_deref(),
        Some(hash(&refresh_token_of(&created)).as_str())
    );
}

#[tokio::test]
async fn test_replayed_refresh_token_revokes_session() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();

    let first = fx
        .service
        .refresh_session(
            &refresh_token_of(&created),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap();
    let second = fx
        .service
        .refresh_session(
            &refresh_token_of(&first),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap();

    let err = fx
        .service
        .refresh_session(
            &refresh_token_of(&first),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.as_session_error(),
        Some(&SessionError::TokenTheftDetected {
            session_handle: created.session.handle.clone(),
            user_id: "user-1".to_string(),
        })
    );

    let err = fx
        .service
        .get_session(&access_token_of(&second), None, false, true, false)
        .await
        .unwrap_err();
    assert_eq!(
        err.as_session_error(),
        Some(&SessionError::Unauthorized {
            reason: "Session does not exist.".to_string()
        })
    );
    assert_eq!(fx.sessions.count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refreshes_yield_one_success() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let refresh_token = refresh_token_of(&created);
    let service = Arc::new(fx.service);

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let token = refresh_token.clone();
            tokio::spawn(async move {
                service
                    .refresh_session(&token, None, false, AccessTokenVersion::V3, false)
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(e.is_unauthorized() || e.is_token_theft()),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_refresh_anti_csrf() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1").with_anti_csrf(true))
        .await
        .unwrap();
    let anti_csrf = created.anti_csrf_token.clone().unwrap();

    let err = fx
        .service
        .refresh_session(
            &refresh_token_of(&created),
            Some("wrong"),
            true,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let refreshed = fx
        .service
        .refresh_session(
            &refresh_token_of(&created),
            Some(&anti_csrf),
            true,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap();
    let new_anti_csrf = refreshed.anti_csrf_token.clone().unwrap();
    assert_ne!(new_anti_csrf, anti_csrf);

    assert!(fx
        .service
        .get_session(&access_token_of(&refreshed), Some(&new_anti_csrf), true, false, false)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_refresh_token_from_another_deployment_is_unauthorized() {
    let ours = Fixture::new();
    let theirs = Fixture::new();
    let created = theirs
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();

    let err = ours
        .service
        .refresh_session(
            &refresh_token_of(&created),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_refresh_of_revoked_or_expired_session() {
    let fx = Fixture::with_config(SessionConfig::default().with_refresh_token_validity(60));
    let revoked = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    let expired = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();

    fx.service
        .revoke_session_using_handle(&revoked.session.handle)
        .await
        .unwrap();
    let err = fx
        .service
        .refresh_session(
            &refresh_token_of(&revoked),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    fx.clock.advance(60_000);
    let err = fx
        .service
        .refresh_session(
            &refresh_token_of(&expired),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_refresh_can_change_token_version() {
    let fx = Fixture::new();
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1").with_version(AccessTokenVersion::V2))
        .await
        .unwrap();

    let refreshed = fx
        .service
        .refresh_session(
            &refresh_token_of(&created),
            None,
            false,
            AccessTokenVersion::V3,
            false,
        )
        .await
        .unwrap();

    let claims = fx
        .service
        .access_tokens()
        .get_info_from_access_token_without_verifying(&access_token_of(&refreshed))
        .unwrap();
    assert_eq!(claims.version(), AccessTokenVersion::V3);
}

#[tokio::test]
async fn test_superseded_chain_is_bounded() {
    let config = SessionConfig {
        refresh_token_chain_depth: 2,
        ..Default::default()
    };
    let fx = Fixture::with_config(config);
    let created = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();

    let mut token = refresh_token_of(&created);
    for _ in 0..4 {
        let refreshed = fx
            .service
            .refresh_session(&token, None, false, AccessTokenVersion::V3, false)
            .await
            .unwrap();
        token = refresh_token_of(&refreshed);
    }

    let row = fx
        .sessions
        .get_session(&created.session.handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.superseded_refresh_token_hash2s.len(), 2);
}
