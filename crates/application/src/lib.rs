//! 应用层实现。
//!
//! 围绕配对与消息的用例服务、实时中继与会话，以及存储抽象和内存实现。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod memory;
pub mod relay;
pub mod repository;
pub mod services;
pub mod session;

pub use broadcaster::{EventBroadcaster, Room};
pub use clock::{Clock, SystemClock};
pub use dto::{LastMessage, LikeOutcome, MatchSummary, MessageDto, ParticipantProfile, ReadReceipt};
pub use error::{ApplicationError, ErrorKind};
pub use events::{AckPayload, ClientEvent, ClientFrame, FrameError, ServerEvent};
pub use memory::{InMemoryIdentityDirectory, InMemoryMatchRepository, InMemoryMessageRepository};
pub use relay::{ConnectionId, RoomRelay};
pub use repository::{IdentityDirectory, MatchRepository, MessageRepository};
pub use services::{
    MatchingService, MatchingServiceDependencies, MessagingService, MessagingServiceDependencies,
    PageLimits, PostMessageRequest, PostedMessage,
};
pub use session::RealtimeSession;
