//! WebSocket 传输
//!
//! 读循环在当前任务里顺序处理客户端帧，当前帧处理完才读下一帧；
//! 写任务独占 socket 的发送端，从会话出站队列和控制命令通道取数据。

use application::{RealtimeSession, ServerEvent};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 写操作命令（协议层控制帧）
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}

pub async fn serve(socket: WebSocket, state: AppState, user_id: UserId) {
    let (session, outbound) = RealtimeSession::open(
        user_id,
        state.relay.clone(),
        state.matching.clone(),
        state.messaging.clone(),
    )
    .await;
    let connection = session.connection();
    tracing::info!(user_id = %user_id, connection = %connection, "websocket connected");

    let (sink, incoming) = socket.split();
    let (cmd_tx, cmd_rx) = mpsc::channel::<WsCommand>(8);
    let send_task = tokio::spawn(write_loop(sink, outbound, cmd_rx));

    read_loop(incoming, &session, &cmd_tx).await;

    // 离开所有房间后出站队列关闭，写任务随之结束
    session.close().await;
    drop(cmd_tx);
    if let Err(err) = send_task.await {
        tracing::warn!(error = %err, "websocket writer task failed");
    }
    tracing::info!(user_id = %user_id, connection = %connection, "websocket disconnected");
}

async fn read_loop(
    mut incoming: SplitStream<WebSocket>,
    session: &RealtimeSession,
    cmd_tx: &mpsc::Sender<WsCommand>,
) {
    while let Some(frame) = incoming.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "websocket read failed");
                break;
            }
        };
        match message {
            WsMessage::Text(text) => session.handle_text(text.as_str()).await,
            WsMessage::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle_text(text).await,
                Err(_) => tracing::debug!("ignoring non utf-8 binary frame"),
            },
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    break;
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Close(_) => {
                tracing::debug!(connection = %session.connection(), "close frame received");
                break;
            }
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
) {
    loop {
        let message = tokio::select! {
            Some(event) = outbound.recv() => match event.to_json() {
                Ok(json) => WsMessage::Text(json.into()),
                Err(err) => {
                    tracing::warn!(error = %err, event = event.name(), "failed to serialize event");
                    continue;
                }
            },
            Some(cmd) = cmd_rx.recv() => match cmd {
                WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
            },
            else => break,
        };

        if sink.send(message).await.is_err() {
            tracing::debug!("websocket send failed");
            break;
        }
    }
    let _ = sink.close().await;
}
