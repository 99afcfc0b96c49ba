mod cleanup_tests;
mod lifecycle_tests;
mod refresh_tests;

use std::sync::Arc;

use ks_shared::SessionConfig;

use crate::repositories::{MockSessionRepository, MockSigningKeyRepository};
use crate::services::clock::MockClock;

use super::SessionService;

/// Session service over in-memory stores and a manual clock
pub(super) struct Fixture {
    pub service: SessionService,
    pub sessions: MockSessionRepository,
    pub keys: MockSigningKeyRepository,
    pub clock: Arc<MockClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let sessions = MockSessionRepository::new();
        let keys = MockSigningKeyRepository::new();
        let clock = Arc::new(MockClock::default());
        let service = SessionService::build(
            Arc::new(sessions.clone()),
            Arc::new(keys.clone()),
            clock.clone(),
            &config,
        )
        .unwrap();

        Self {
            service,
            sessions,
            keys,
            clock,
        }
    }
}
