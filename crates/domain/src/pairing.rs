use serde::{Deserialize, Serialize};

use crate::value_objects::{MatchAlias, MatchId, MessageId, Timestamp, UserId, UserPair};

/// 两个用户之间的配对，同时也是他们会话的容器。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub users: UserPair,
    pub alias: Option<MatchAlias>,
    /// 最近一条消息的弱引用
    pub last_message_id: Option<MessageId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Match {
    pub fn new(id: MatchId, users: UserPair, created_at: Timestamp) -> Self {
        Self {
            id,
            users,
            alias: None,
            last_message_id: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.users.contains(user)
    }

    pub fn record_last_message(&mut self, message_id: MessageId, at: Timestamp) {
        self.last_message_id = Some(message_id);
        self.updated_at = at.max(self.updated_at);
    }

    pub fn set_alias(&mut self, alias: MatchAlias, at: Timestamp) {
        self.alias = Some(alias);
        self.updated_at = at.max(self.updated_at);
    }
}
