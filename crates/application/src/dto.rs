use domain::{Attachment, MatchAlias, MatchId, Message, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// 会话列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: MatchId,
    pub alias: Option<MatchAlias>,
    pub users: [UserId; 2],
    pub participants: Vec<ParticipantProfile>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub id: UserId,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: MessageId,
    pub from: UserId,
    pub text: String,
    pub created_at: Timestamp,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            from: message.sender_id,
            text: message.body.as_str().to_owned(),
            created_at: message.created_at,
        }
    }
}

/// 消息的对外表示，HTTP 和实时通道共用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: MessageId,
    pub match_id: MatchId,
    pub from: UserId,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub seen_by: Vec<UserId>,
    pub created_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            match_id: message.match_id,
            from: message.sender_id,
            text: message.body.as_str().to_owned(),
            attachments: message.attachments.clone(),
            seen_by: message.seen_by.iter().copied().collect(),
            created_at: message.created_at,
        }
    }
}

/// 标记已读的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub match_id: MatchId,
    pub reader_id: UserId,
    /// 本次新插入的已读记录数
    pub updated_count: u64,
    pub remaining_unread: u64,
    /// 请求中的消息ID（去重、保持顺序）
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    pub match_id: MatchId,
    pub created: bool,
}
