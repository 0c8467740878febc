#![allow(dead_code)]

use std::sync::Arc;

use application::{InMemoryIdentityDirectory, InMemoryMatchRepository, InMemoryMessageRepository};
use axum::Router;
use config::{AppConfig, MEMORY_DATABASE_URL};
use domain::UserId;
use web_api::{router, AppState, Repositories};

pub const TEST_SECRET: &str = "integration-test-secret-with-enough-length";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = MEMORY_DATABASE_URL.to_string();
    config.jwt.secret = TEST_SECRET.to_string();
    config
}

/// 使用内存存储的完整应用
pub struct TestApp {
    pub state: AppState,
    pub identities: Arc<InMemoryIdentityDirectory>,
}

impl TestApp {
    pub fn new() -> Self {
        let identities = Arc::new(InMemoryIdentityDirectory::new());
        let repositories = Repositories {
            matches: Arc::new(InMemoryMatchRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            identities: identities.clone(),
        };
        let state = AppState::new(repositories, &test_config());
        Self { state, identities }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub fn token_for(&self, user: UserId) -> String {
        self.state
            .jwt_service
            .generate_token(user)
            .expect("token generation")
    }
}
