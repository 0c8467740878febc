//! 集成测试共用的内存环境

#![allow(dead_code)]

use std::sync::Arc;

use application::{
    ClientFrame, InMemoryIdentityDirectory, InMemoryMatchRepository, InMemoryMessageRepository,
    MatchingService, MatchingServiceDependencies, MessagingService, MessagingServiceDependencies,
    PageLimits, RealtimeSession, RoomRelay, ServerEvent, SystemClock,
};
use domain::UserId;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

pub struct TestApp {
    pub matches: Arc<InMemoryMatchRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub identities: Arc<InMemoryIdentityDirectory>,
    pub relay: Arc<RoomRelay>,
    pub matching: Arc<MatchingService>,
    pub messaging: Arc<MessagingService>,
}

impl TestApp {
    pub fn new() -> Self {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let identities = Arc::new(InMemoryIdentityDirectory::new());
        let relay = Arc::new(RoomRelay::new(64));
        let clock = Arc::new(SystemClock);

        let matching = Arc::new(MatchingService::new(MatchingServiceDependencies {
            match_repository: matches.clone(),
            clock: clock.clone(),
        }));
        let messaging = Arc::new(MessagingService::new(MessagingServiceDependencies {
            matching: matching.clone(),
            match_repository: matches.clone(),
            message_repository: messages.clone(),
            identity_directory: identities.clone(),
            broadcaster: relay.clone(),
            clock,
            page_limits: PageLimits::default(),
        }));

        Self {
            matches,
            messages,
            identities,
            relay,
            matching,
            messaging,
        }
    }

    pub async fn connect(&self, user: UserId) -> Client {
        let (session, outbound) = RealtimeSession::open(
            user,
            self.relay.clone(),
            self.matching.clone(),
            self.messaging.clone(),
        )
        .await;
        Client { session, outbound }
    }
}

/// 一个模拟的实时连接
pub struct Client {
    pub session: RealtimeSession,
    pub outbound: mpsc::Receiver<ServerEvent>,
}

impl Client {
    pub async fn send(&self, frame: serde_json::Value) {
        let frame = ClientFrame::parse(&frame.to_string()).expect("valid frame");
        self.session.handle(frame).await;
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        timeout(Duration::from_secs(1), self.outbound.recv())
            .await
            .expect("event within timeout")
            .expect("outbound queue open")
    }

    pub fn assert_idle(&mut self) {
        assert!(
            self.outbound.try_recv().is_err(),
            "unexpected pending event"
        );
    }

    /// 丢弃已排队的事件
    pub fn drain(&mut self) {
        while self.outbound.try_recv().is_ok() {}
    }
}
