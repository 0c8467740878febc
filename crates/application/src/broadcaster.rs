use std::fmt;

use async_trait::async_trait;
use domain::{MatchId, UserId};

use crate::events::ServerEvent;

/// 广播房间：配对房间或用户个人房间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Match(MatchId),
    User(UserId),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Match(id) => write!(f, "match:{id}"),
            Room::User(id) => write!(f, "user:{id}"),
        }
    }
}

#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// 向房间内所有连接投递事件，返回成功入队的连接数
    async fn broadcast(&self, room: Room, event: ServerEvent) -> usize;
}
