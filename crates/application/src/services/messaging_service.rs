use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use config::MessagesConfig;
use domain::{Attachment, Match, MatchId, Message, MessageBody, MessageId, Timestamp, UserId};
use tracing::{debug, info};

use crate::{
    broadcaster::{EventBroadcaster, Room},
    clock::Clock,
    dto::{LastMessage, MatchSummary, MessageDto, ParticipantProfile, ReadReceipt},
    error::ApplicationError,
    events::{
        MatchUpdatedPayload, MessagesReadPayload, NewMessagePayload, ServerEvent, TypingPayload,
    },
    repository::{IdentityDirectory, MatchRepository, MessageRepository},
    services::MatchingService,
};

/// 分页大小限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default: u32,
    pub max: u32,
}

impl PageLimits {
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default).clamp(1, self.max.max(1))
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default: 30,
            max: 100,
        }
    }
}

impl From<&MessagesConfig> for PageLimits {
    fn from(config: &MessagesConfig) -> Self {
        Self {
            default: config.default_page_size,
            max: config.max_page_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostMessageRequest {
    pub match_ref: String,
    pub sender_id: UserId,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// 已持久化、尚未广播的消息
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub room: Match,
    pub message: Message,
}

pub struct MessagingServiceDependencies {
    pub matching: Arc<MatchingService>,
    pub match_repository: Arc<dyn MatchRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub identity_directory: Arc<dyn IdentityDirectory>,
    pub broadcaster: Arc<dyn EventBroadcaster>,
    pub clock: Arc<dyn Clock>,
    pub page_limits: PageLimits,
}

pub struct MessagingService {
    deps: MessagingServiceDependencies,
}

impl MessagingService {
    pub fn new(deps: MessagingServiceDependencies) -> Self {
        Self { deps }
    }

    /// 校验并持久化消息，同时更新配对的最近消息。不做广播。
    pub async fn post_message(
        &self,
        request: PostMessageRequest,
    ) -> Result<PostedMessage, ApplicationError> {
        let room = self
            .deps
            .matching
            .authorize(&request.match_ref, request.sender_id)
            .await?;

        let body = MessageBody::new(request.text)?;
        let message = Message::new(
            MessageId::generate(),
            room.id,
            request.sender_id,
            body,
            request.attachments,
            self.deps.clock.now(),
        )?;

        let stored = self.deps.message_repository.append(message).await?;
        self.deps
            .match_repository
            .record_last_message(room.id, stored.id, stored.created_at)
            .await?;

        info!(
            match_id = %room.id,
            message_id = %stored.id,
            sender_id = %stored.sender_id,
            attachments = stored.attachments.len(),
            "message stored"
        );
        Ok(PostedMessage {
            room,
            message: stored,
        })
    }

    /// 向配对房间广播新消息，再通知每个成员的个人房间
    pub async fn announce_message(&self, posted: &PostedMessage, client_temp_id: Option<String>) {
        let message = &posted.message;
        self.deps
            .broadcaster
            .broadcast(
                Room::Match(message.match_id),
                ServerEvent::NewMessage(NewMessagePayload {
                    message: MessageDto::from(message),
                    client_temp_id,
                }),
            )
            .await;

        let update = MatchUpdatedPayload {
            match_id: message.match_id,
            text: message.body.as_str().to_owned(),
            created_at: message.created_at,
            from: message.sender_id,
        };
        for member in posted.room.users.members() {
            self.deps
                .broadcaster
                .broadcast(Room::User(member), ServerEvent::MatchUpdated(update.clone()))
                .await;
        }
    }

    /// 持久化并广播
    pub async fn send_message(
        &self,
        request: PostMessageRequest,
        client_temp_id: Option<String>,
    ) -> Result<Message, ApplicationError> {
        let posted = self.post_message(request).await?;
        self.announce_message(&posted, client_temp_id).await;
        Ok(posted.message)
    }

    /// 记录已读，不做广播。空列表直接返回 0。
    pub async fn record_reads(
        &self,
        reader: UserId,
        match_ref: &str,
        message_ids: Vec<MessageId>,
    ) -> Result<ReadReceipt, ApplicationError> {
        let room = self.deps.matching.authorize(match_ref, reader).await?;

        let mut seen = BTreeSet::new();
        let message_ids: Vec<MessageId> = message_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        let updated_count = if message_ids.is_empty() {
            0
        } else {
            self.deps
                .message_repository
                .mark_seen(room.id, reader, &message_ids)
                .await?
        };
        let remaining_unread = self
            .deps
            .message_repository
            .unread_count(room.id, reader)
            .await?;

        debug!(
            match_id = %room.id,
            reader_id = %reader,
            requested = message_ids.len(),
            updated_count,
            remaining_unread,
            "read receipts recorded"
        );
        Ok(ReadReceipt {
            match_id: room.id,
            reader_id: reader,
            updated_count,
            remaining_unread,
            message_ids,
        })
    }

    pub async fn announce_reads(&self, receipt: &ReadReceipt) {
        if receipt.message_ids.is_empty() {
            return;
        }
        self.deps
            .broadcaster
            .broadcast(
                Room::Match(receipt.match_id),
                ServerEvent::MessagesRead(MessagesReadPayload {
                    match_id: receipt.match_id,
                    reader_id: receipt.reader_id,
                    message_ids: receipt.message_ids.clone(),
                }),
            )
            .await;
    }

    pub async fn mark_read(
        &self,
        reader: UserId,
        match_ref: &str,
        message_ids: Vec<MessageId>,
    ) -> Result<ReadReceipt, ApplicationError> {
        let receipt = self.record_reads(reader, match_ref, message_ids).await?;
        self.announce_reads(&receipt).await;
        Ok(receipt)
    }

    /// 输入状态只广播，不持久化
    pub async fn typing(
        &self,
        user: UserId,
        match_ref: &str,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let room = self.deps.matching.authorize(match_ref, user).await?;
        self.deps
            .broadcaster
            .broadcast(
                Room::Match(room.id),
                ServerEvent::Typing(TypingPayload {
                    match_id: room.id,
                    user_id: user,
                    is_typing,
                }),
            )
            .await;
        Ok(())
    }

    pub async fn unread_count(
        &self,
        match_id: MatchId,
        user: UserId,
    ) -> Result<u64, ApplicationError> {
        Ok(self
            .deps
            .message_repository
            .unread_count(match_id, user)
            .await?)
    }

    /// 用户的会话列表，最近活跃的在前
    pub async fn list_rooms(&self, user: UserId) -> Result<Vec<MatchSummary>, ApplicationError> {
        let matches = self.deps.match_repository.list_for_user(user).await?;
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let match_ids: Vec<MatchId> = matches.iter().map(|m| m.id).collect();
        let unread = self
            .deps
            .message_repository
            .unread_counts(&match_ids, user)
            .await?;

        let user_ids: Vec<UserId> = matches
            .iter()
            .flat_map(|m| m.users.members())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names = self.deps.identity_directory.display_names(&user_ids).await?;

        let last_ids: Vec<MessageId> = matches.iter().filter_map(|m| m.last_message_id).collect();
        let last_messages: HashMap<MessageId, LastMessage> = self
            .deps
            .message_repository
            .find_by_ids(&last_ids)
            .await?
            .iter()
            .map(|message| (message.id, LastMessage::from(message)))
            .collect();

        Ok(matches
            .into_iter()
            .map(|m| MatchSummary {
                id: m.id,
                alias: m.alias,
                users: m.users.members(),
                participants: m
                    .users
                    .members()
                    .into_iter()
                    .map(|id| ParticipantProfile {
                        id,
                        display_name: names.get(&id).cloned(),
                    })
                    .collect(),
                last_message: m
                    .last_message_id
                    .and_then(|id| last_messages.get(&id).cloned()),
                unread_count: unread.get(&m.id).copied().unwrap_or(0),
                created_at: m.created_at,
                updated_at: m.updated_at,
            })
            .collect())
    }

    /// 按时间升序返回 `before` 之前最新的一页消息
    pub async fn list_messages(
        &self,
        user: UserId,
        match_ref: &str,
        before: Option<Timestamp>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let room = self.deps.matching.authorize(match_ref, user).await?;
        let limit = self.deps.page_limits.clamp(limit);
        Ok(self
            .deps
            .message_repository
            .list_page(room.id, before, limit)
            .await?)
    }
}
