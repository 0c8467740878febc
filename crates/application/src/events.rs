//! 实时通道的帧格式
//!
//! 客户端帧：`{"event": "...", "data": {...}, "ackId": 1}`，
//! 服务端帧：`{"event": "...", "data": {...}}`。字段统一使用 camelCase。

use domain::{Attachment, MatchId, MessageId, Timestamp, UserId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dto::MessageDto;
use crate::error::ApplicationError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "joined")]
    Joined(JoinedPayload),
    #[serde(rename = "message:new")]
    NewMessage(NewMessagePayload),
    #[serde(rename = "message:read")]
    MessagesRead(MessagesReadPayload),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "match:updated")]
    MatchUpdated(MatchUpdatedPayload),
    #[serde(rename = "ack")]
    Ack(AckPayload),
    #[serde(rename = "pong")]
    Pong {},
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined(_) => "joined",
            ServerEvent::NewMessage(_) => "message:new",
            ServerEvent::MessagesRead(_) => "message:read",
            ServerEvent::Typing(_) => "typing",
            ServerEvent::MatchUpdated(_) => "match:updated",
            ServerEvent::Ack(_) => "ack",
            ServerEvent::Pong {} => "pong",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub match_id: MatchId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    #[serde(flatten)]
    pub message: MessageDto,
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesReadPayload {
    pub match_id: MatchId,
    pub reader_id: UserId,
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// 推送到成员个人房间，用于刷新会话列表
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchUpdatedPayload {
    pub match_id: MatchId,
    pub text: String,
    pub created_at: Timestamp,
    pub from: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&ApplicationError> for ErrorPayload {
    fn from(err: &ApplicationError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.public_message(),
        }
    }
}

/// 对带 `ackId` 的请求的应答，只发给请求方
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub ack_id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_temp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl AckPayload {
    fn empty(ack_id: u64, ok: bool) -> Self {
        Self {
            ack_id,
            ok,
            server_id: None,
            client_temp_id: None,
            updated: None,
            error: None,
        }
    }

    pub fn sent(ack_id: u64, server_id: MessageId, client_temp_id: Option<String>) -> Self {
        Self {
            server_id: Some(server_id),
            client_temp_id,
            ..Self::empty(ack_id, true)
        }
    }

    pub fn read(ack_id: u64, updated: u64) -> Self {
        Self {
            updated: Some(updated),
            ..Self::empty(ack_id, true)
        }
    }

    pub fn failed(ack_id: u64, err: &ApplicationError) -> Self {
        Self {
            error: Some(ErrorPayload::from(err)),
            ..Self::empty(ack_id, false)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(alias = "matchId")]
    pub match_ref: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(alias = "matchId")]
    pub match_ref: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[serde(alias = "matchId")]
    pub match_ref: String,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    #[serde(alias = "matchId")]
    pub match_ref: String,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Join(JoinRequest),
    Message(SendRequest),
    MarkRead(MarkReadRequest),
    Typing(TypingRequest),
    Ping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub event: ClientEvent,
    pub ack_id: Option<u64>,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    pub fn code(&self) -> &'static str {
        match self {
            FrameError::Malformed(_) => "malformed_frame",
            FrameError::UnknownEvent(_) => "unknown_event",
            FrameError::InvalidPayload { .. } => "invalid_payload",
        }
    }
}

impl From<&FrameError> for ErrorPayload {
    fn from(err: &FrameError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    ack_id: Option<u64>,
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data).map_err(|source| FrameError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(FrameError::Malformed)?;
        let event = match raw.event.as_str() {
            "join" => ClientEvent::Join(payload(&raw.event, raw.data)?),
            "message" => ClientEvent::Message(payload(&raw.event, raw.data)?),
            "message:read" => ClientEvent::MarkRead(payload(&raw.event, raw.data)?),
            "typing" => ClientEvent::Typing(payload(&raw.event, raw.data)?),
            "ping" => ClientEvent::Ping,
            other => return Err(FrameError::UnknownEvent(other.to_string())),
        };
        Ok(Self {
            event,
            ack_id: raw.ack_id,
        })
    }
}

/// 解析客户端传入的消息ID，忽略无效值并去重
pub fn parse_message_ids<S: AsRef<str>>(raw: &[S]) -> Vec<MessageId> {
    let mut ids: Vec<MessageId> = Vec::with_capacity(raw.len());
    for id in raw.iter().filter_map(|value| value.as_ref().parse::<MessageId>().ok()) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
