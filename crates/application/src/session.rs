//! 单个实时连接的会话状态机
//!
//! 连接认证后由传输层创建，按到达顺序逐个处理客户端事件。
//! 失败只通过应答告知请求方，不广播、不断开连接。

use std::sync::Arc;

use domain::UserId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    events::{
        parse_message_ids, AckPayload, ClientEvent, ClientFrame, ErrorPayload, JoinedPayload,
        ServerEvent,
    },
    relay::{ConnectionId, RoomRelay},
    services::{MatchingService, MessagingService, PostMessageRequest},
};

pub struct RealtimeSession {
    connection: ConnectionId,
    user_id: UserId,
    relay: Arc<RoomRelay>,
    matching: Arc<MatchingService>,
    messaging: Arc<MessagingService>,
}

impl RealtimeSession {
    /// 注册连接（自动加入个人房间），返回会话和该连接的出站队列
    pub async fn open(
        user_id: UserId,
        relay: Arc<RoomRelay>,
        matching: Arc<MatchingService>,
        messaging: Arc<MessagingService>,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (connection, outbound) = relay.connect(user_id).await;
        (
            Self {
                connection,
                user_id,
                relay,
                matching,
                messaging,
            },
            outbound,
        )
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// 处理一帧文本，格式错误时只回一个 `error` 事件
    pub async fn handle_text(&self, text: &str) {
        match ClientFrame::parse(text) {
            Ok(frame) => self.handle(frame).await,
            Err(err) => {
                debug!(connection = %self.connection, error = %err, "rejected client frame");
                self.reply(ServerEvent::Error(ErrorPayload::from(&err)))
                    .await;
            }
        }
    }

    pub async fn handle(&self, frame: ClientFrame) {
        let ack_id = frame.ack_id;
        match frame.event {
            ClientEvent::Join(request) => {
                match self.matching.authorize(&request.match_ref, self.user_id).await {
                    Ok(room) => {
                        if self.relay.enter_match_room(self.connection, room.id).await {
                            self.reply(ServerEvent::Joined(JoinedPayload { match_id: room.id }))
                                .await;
                        }
                    }
                    Err(err) => {
                        debug!(
                            user_id = %self.user_id,
                            match_ref = %request.match_ref,
                            error = %err,
                            "join ignored"
                        );
                    }
                }
            }
            ClientEvent::Message(request) => {
                let client_temp_id = request.client_temp_id.clone();
                let result = self
                    .messaging
                    .post_message(PostMessageRequest {
                        match_ref: request.match_ref,
                        sender_id: self.user_id,
                        text: request.text,
                        attachments: request.attachments,
                    })
                    .await;

                match result {
                    Ok(posted) => {
                        if let Some(ack_id) = ack_id {
                            self.reply(ServerEvent::Ack(AckPayload::sent(
                                ack_id,
                                posted.message.id,
                                client_temp_id.clone(),
                            )))
                            .await;
                        }
                        self.messaging
                            .announce_message(&posted, client_temp_id)
                            .await;
                    }
                    Err(err) => {
                        debug!(user_id = %self.user_id, error = %err, "message rejected");
                        self.fail(ack_id, &err).await;
                    }
                }
            }
            ClientEvent::MarkRead(request) => {
                let ids = parse_message_ids(&request.message_ids);
                match self
                    .messaging
                    .record_reads(self.user_id, &request.match_ref, ids)
                    .await
                {
                    Ok(receipt) => {
                        if let Some(ack_id) = ack_id {
                            self.reply(ServerEvent::Ack(AckPayload::read(
                                ack_id,
                                receipt.updated_count,
                            )))
                            .await;
                        }
                        self.messaging.announce_reads(&receipt).await;
                    }
                    Err(err) => {
                        debug!(user_id = %self.user_id, error = %err, "read receipt rejected");
                        self.fail(ack_id, &err).await;
                    }
                }
            }
            ClientEvent::Typing(request) => {
                if let Err(err) = self
                    .messaging
                    .typing(self.user_id, &request.match_ref, request.is_typing)
                    .await
                {
                    debug!(user_id = %self.user_id, error = %err, "typing ignored");
                }
            }
            ClientEvent::Ping => self.reply(ServerEvent::Pong {}).await,
        }
    }

    /// 离开全部房间；之后的应答会被丢弃
    pub async fn close(&self) {
        self.relay.disconnect(self.connection).await;
    }

    async fn fail(&self, ack_id: Option<u64>, err: &crate::ApplicationError) {
        if let Some(ack_id) = ack_id {
            self.reply(ServerEvent::Ack(AckPayload::failed(ack_id, err)))
                .await;
        }
    }

    async fn reply(&self, event: ServerEvent) {
        if !self.relay.send_to(self.connection, event).await {
            warn!(connection = %self.connection, "reply dropped");
        }
    }
}
