use std::sync::Arc;

use application::{
    IdentityDirectory, MatchRepository, MatchingService, MatchingServiceDependencies,
    MessageRepository, MessagingService, MessagingServiceDependencies, PageLimits, RoomRelay,
    SystemClock,
};
use config::AppConfig;

use crate::JwtService;

/// 存储实现（Postgres 或内存）
pub struct Repositories {
    pub matches: Arc<dyn MatchRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub identities: Arc<dyn IdentityDirectory>,
}

#[derive(Clone)]
pub struct AppState {
    pub matching: Arc<MatchingService>,
    pub messaging: Arc<MessagingService>,
    pub relay: Arc<RoomRelay>,
    pub jwt_service: Arc<JwtService>,
    pub cors_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(repositories: Repositories, config: &AppConfig) -> Self {
        let clock = Arc::new(SystemClock);
        let relay = Arc::new(RoomRelay::new(config.relay.connection_buffer));

        let matching = Arc::new(MatchingService::new(MatchingServiceDependencies {
            match_repository: repositories.matches.clone(),
            clock: clock.clone(),
        }));
        let messaging = Arc::new(MessagingService::new(MessagingServiceDependencies {
            matching: matching.clone(),
            match_repository: repositories.matches,
            message_repository: repositories.messages,
            identity_directory: repositories.identities,
            broadcaster: relay.clone(),
            clock,
            page_limits: PageLimits::from(&config.messages),
        }));

        Self {
            matching,
            messaging,
            relay,
            jwt_service: Arc::new(JwtService::new(config.jwt.clone())),
            cors_origins: config.server.cors_origins.clone().into(),
        }
    }
}
