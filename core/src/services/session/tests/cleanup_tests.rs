//! Tests for the expired session and signing key sweep

use std::sync::Arc;

use ks_shared::SessionConfig;

use crate::services::session::{CreateSessionRequest, SessionCleanupConfig, SessionCleanupService};

use super::Fixture;

fn cleanup_service(fx: &Fixture, config: SessionCleanupConfig) -> SessionCleanupService {
    SessionCleanupService::new(
        Arc::new(fx.sessions.clone()),
        Arc::clone(fx.service.key_manager()),
        fx.clock.clone(),
        config,
    )
}

#[tokio::test]
async fn test_cleanup_removes_expired_sessions_and_keys() {
    let config = SessionConfig::default()
        .with_refresh_token_validity(60)
        .with_access_token_validity(1)
        .with_signing_key_update_interval(1);
    let fx = Fixture::with_config(config);

    fx.service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    fx.clock.advance(30_000);
    let live = fx
        .service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    fx.clock.advance(30_000);

    let cleanup = cleanup_service(&fx, SessionCleanupConfig::default());
    let result = cleanup.run_cleanup().await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.expired_sessions_deleted, 1);
    assert_eq!(result.expired_signing_keys_deleted, 2);
    assert_eq!(result.total_cleaned(), 3);
    assert_eq!(fx.sessions.count().await, 1);
    assert!(fx
        .service
        .get_session_information(&live.session.handle)
        .await
        .is_ok());
    assert!(fx.keys.all_keys().await.is_empty());

    let result = cleanup.run_cleanup().await.unwrap();
    assert_eq!(result.total_cleaned(), 0);
}

#[tokio::test]
async fn test_disabled_cleanup_does_nothing() {
    let fx = Fixture::with_config(SessionConfig::default().with_refresh_token_validity(60));
    fx.service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    fx.clock.advance(120_000);

    let cleanup = Arc::new(cleanup_service(
        &fx,
        SessionCleanupConfig {
            enabled: false,
            ..Default::default()
        },
    ));

    let result = cleanup.run_cleanup().await.unwrap();
    assert_eq!(result.total_cleaned(), 0);
    assert_eq!(fx.sessions.count().await, 1);
    assert!(cleanup.start_background_task().is_none());
}

#[tokio::test]
async fn test_background_task_runs_first_cycle_immediately() {
    let fx = Fixture::with_config(SessionConfig::default().with_refresh_token_validity(60));
    fx.service
        .create_new_session(CreateSessionRequest::new("user-1"))
        .await
        .unwrap();
    fx.clock.advance(120_000);

    let cleanup = Arc::new(cleanup_service(&fx, SessionCleanupConfig::default()));
    let handle = cleanup.start_background_task().unwrap();

    for _ in 0..100 {
        if fx.sessions.count().await == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    handle.abort();

    assert_eq!(fx.sessions.count().await, 0);
}
