use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MatchId, MessageBody, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    #[default]
    File,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::File => "file",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "image" => Self::Image,
            _ => Self::File,
        }
    }
}

/// 附件元数据，上传与存储由外部服务负责。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// 配对内的一条消息。只追加，唯一允许的变更是 `seen_by` 的集合插入。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub body: MessageBody,
    pub attachments: Vec<Attachment>,
    pub seen_by: BTreeSet<UserId>,
    pub created_at: Timestamp,
}

impl Message {
    /// 创建新消息，发送者自动记入 `seen_by`。
    pub fn new(
        id: MessageId,
        match_id: MatchId,
        sender_id: UserId,
        body: MessageBody,
        attachments: Vec<Attachment>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if body.is_empty() && attachments.is_empty() {
            return Err(DomainError::invalid_argument("text", "cannot be empty"));
        }
        if attachments.iter().any(|a| a.url.trim().is_empty()) {
            return Err(DomainError::invalid_argument(
                "attachments",
                "attachment url cannot be empty",
            ));
        }
        Ok(Self {
            id,
            match_id,
            sender_id,
            body,
            attachments,
            seen_by: BTreeSet::from([sender_id]),
            created_at,
        })
    }

    /// 记录已读；返回 true 表示这是新插入。
    ///
    /// 发送者本人不会被计入（他本来就在集合里）。
    pub fn mark_seen_by(&mut self, reader: UserId) -> bool {
        if reader == self.sender_id {
            return false;
        }
        self.seen_by.insert(reader)
    }

    pub fn is_unread_for(&self, user: UserId) -> bool {
        self.sender_id != user && !self.seen_by.contains(&user)
    }
}
