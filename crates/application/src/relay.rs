//! 房间中继
//!
//! 维护连接与房间的成员关系，并通过每个连接自己的有界队列投递事件。
//! 投递使用 `try_send`，慢连接的队列满了只丢弃该连接的事件。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::{MatchId, UserId};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::broadcaster::{EventBroadcaster, Room};
use crate::events::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    user_id: UserId,
    sender: mpsc::Sender<ServerEvent>,
    match_room: Option<MatchId>,
}

#[derive(Default)]
struct RelayState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<Room, HashSet<ConnectionId>>,
}

impl RelayState {
    fn join(&mut self, room: Room, connection: ConnectionId) {
        self.rooms.entry(room).or_default().insert(connection);
    }

    fn leave(&mut self, room: Room, connection: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&connection);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }
}

pub struct RoomRelay {
    buffer: usize,
    next_id: AtomicU64,
    state: RwLock<RelayState>,
}

impl RoomRelay {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            state: RwLock::new(RelayState::default()),
        }
    }

    /// 注册已认证的连接并加入其个人房间
    pub async fn connect(&self, user_id: UserId) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);

        let mut state = self.state.write().await;
        state.connections.insert(
            id,
            Connection {
                user_id,
                sender,
                match_room: None,
            },
        );
        state.join(Room::User(user_id), id);
        debug!(connection = %id, user_id = %user_id, "connection registered");
        (id, receiver)
    }

    /// 切换连接所在的配对房间，一个连接同时最多在一个配对房间里。
    /// 连接已断开时返回 false。
    pub async fn enter_match_room(&self, connection: ConnectionId, match_id: MatchId) -> bool {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.get_mut(&connection) else {
            return false;
        };
        let previous = entry.match_room.replace(match_id);

        if let Some(previous) = previous {
            state.leave(Room::Match(previous), connection);
        }
        state.join(Room::Match(match_id), connection);
        true
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.write().await;
        let Some(entry) = state.connections.remove(&connection) else {
            return;
        };

        state.leave(Room::User(entry.user_id), connection);
        if let Some(match_id) = entry.match_room {
            state.leave(Room::Match(match_id), connection);
        }
        debug!(connection = %connection, user_id = %entry.user_id, "connection removed");
    }

    /// 只投递给一个连接（应答、joined、pong 等）
    pub async fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let state = self.state.read().await;
        match state.connections.get(&connection) {
            Some(entry) => deliver(connection, entry, event),
            None => false,
        }
    }

    pub async fn room_members(&self, room: Room) -> Vec<ConnectionId> {
        let state = self.state.read().await;
        let mut members: Vec<ConnectionId> = state
            .rooms
            .get(&room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

fn deliver(id: ConnectionId, entry: &Connection, event: ServerEvent) -> bool {
    match entry.sender.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(
                connection = %id,
                user_id = %entry.user_id,
                event = event.name(),
                "outbound queue full, dropping event"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(connection = %id, "outbound queue closed");
            false
        }
    }
}

#[async_trait]
impl EventBroadcaster for RoomRelay {
    async fn broadcast(&self, room: Room, event: ServerEvent) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(&room) else {
            return 0;
        };

        let mut delivered = 0;
        for id in members {
            if let Some(entry) = state.connections.get(id) {
                if deliver(*id, entry, event.clone()) {
                    delivered += 1;
                }
            }
        }
        debug!(room = %room, event = event.name(), delivered, "broadcast");
        delivered
    }
}
