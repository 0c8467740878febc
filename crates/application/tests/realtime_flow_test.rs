//! 完整实时流程：点赞 -> 加入 -> 发送 -> 接收 -> 已读 -> 回执 -> 会话列表

mod common;

use application::ServerEvent;
use common::TestApp;
use domain::UserId;
use serde_json::json;

#[tokio::test]
async fn like_send_receive_and_read() {
    let app = TestApp::new();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let match_id = app.matching.like(alice, bob).await.unwrap().match_id;
    let room = match_id.to_string();

    let mut alice_client = app.connect(alice).await;
    let mut bob_client = app.connect(bob).await;

    for client in [&mut alice_client, &mut bob_client] {
        client
            .send(json!({"event": "join", "data": {"matchRef": room}}))
            .await;
        match client.next_event().await {
            ServerEvent::Joined(joined) => assert_eq!(joined.match_id, match_id),
            other => panic!("expected joined, got {other:?}"),
        }
    }

    alice_client
        .send(json!({
            "event": "message",
            "data": {"matchRef": room, "text": "  park at 5?  ", "clientTempId": "tmp-1"},
            "ackId": 1
        }))
        .await;

    // 发送方先收到应答，再收到房间广播
    let server_id = match alice_client.next_event().await {
        ServerEvent::Ack(ack) => {
            assert!(ack.ok);
            assert_eq!(ack.ack_id, 1);
            assert_eq!(ack.client_temp_id.as_deref(), Some("tmp-1"));
            ack.server_id.expect("server id")
        }
        other => panic!("expected ack, got {other:?}"),
    };
    assert!(matches!(alice_client.next_event().await, ServerEvent::NewMessage(_)));
    assert!(matches!(alice_client.next_event().await, ServerEvent::MatchUpdated(_)));

    let received = match bob_client.next_event().await {
        ServerEvent::NewMessage(payload) => payload,
        other => panic!("expected message:new, got {other:?}"),
    };
    assert_eq!(received.message.id, server_id);
    assert_eq!(received.message.text, "park at 5?");
    assert_eq!(received.message.from, alice);
    assert_eq!(received.client_temp_id.as_deref(), Some("tmp-1"));
    assert_eq!(received.message.seen_by, vec![alice]);
    match bob_client.next_event().await {
        ServerEvent::MatchUpdated(update) => {
            assert_eq!(update.match_id, match_id);
            assert_eq!(update.text, "park at 5?");
        }
        other => panic!("expected match:updated, got {other:?}"),
    }

    let rooms = app.messaging.list_rooms(bob).await.unwrap();
    assert_eq!(rooms[0].unread_count, 1);

    bob_client
        .send(json!({
            "event": "message:read",
            "data": {"matchRef": room, "messageIds": [server_id.to_string()]},
            "ackId": 2
        }))
        .await;
    match bob_client.next_event().await {
        ServerEvent::Ack(ack) => {
            assert!(ack.ok);
            assert_eq!(ack.updated, Some(1));
        }
        other => panic!("expected ack, got {other:?}"),
    }

    match alice_client.next_event().await {
        ServerEvent::MessagesRead(receipt) => {
            assert_eq!(receipt.match_id, match_id);
            assert_eq!(receipt.reader_id, bob);
            assert_eq!(receipt.message_ids, vec![server_id]);
        }
        other => panic!("expected message:read, got {other:?}"),
    }

    let rooms = app.messaging.list_rooms(bob).await.unwrap();
    assert_eq!(rooms[0].unread_count, 0);
    let rooms = app.messaging.list_rooms(alice).await.unwrap();
    assert_eq!(rooms[0].unread_count, 0);
}

#[tokio::test]
async fn typing_reaches_the_match_room() {
    let app = TestApp::new();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let match_id = app.matching.like(alice, bob).await.unwrap().match_id;
    let room = match_id.to_string();

    let alice_client = app.connect(alice).await;
    let mut bob_client = app.connect(bob).await;
    bob_client
        .send(json!({"event": "join", "data": {"matchRef": room}}))
        .await;
    bob_client.drain();

    alice_client
        .send(json!({"event": "typing", "data": {"matchRef": room, "isTyping": true}}))
        .await;
    let typing = serde_json::to_value(bob_client.next_event().await).unwrap();
    assert_eq!(
        typing,
        json!({
            "event": "typing",
            "data": {"matchId": room, "userId": alice.to_string(), "isTyping": true}
        })
    );
}

#[tokio::test]
async fn disconnected_client_stops_receiving() {
    let app = TestApp::new();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let match_id = app.matching.like(alice, bob).await.unwrap().match_id;
    let room = match_id.to_string();

    let mut bob_client = app.connect(bob).await;
    bob_client
        .send(json!({"event": "join", "data": {"matchRef": room}}))
        .await;
    bob_client.drain();
    bob_client.session.close().await;

    let alice_client = app.connect(alice).await;
    alice_client
        .send(json!({"event": "message", "data": {"matchRef": room, "text": "still there?"}}))
        .await;

    // 消息仍然持久化
    assert_eq!(app.messaging.unread_count(match_id, bob).await.unwrap(), 1);
    bob_client.assert_idle();
    assert_eq!(app.relay.connection_count().await, 1);
}

#[tokio::test]
async fn malformed_frames_get_an_error_event() {
    let app = TestApp::new();
    let mut client = app.connect(UserId::generate()).await;
    client.session.handle_text("{not json").await;
    match client.next_event().await {
        ServerEvent::Error(err) => assert_eq!(err.code, "malformed_frame"),
        other => panic!("expected error, got {other:?}"),
    }

    client.session.handle_text(r#"{"event":"ping"}"#).await;
    assert_eq!(client.next_event().await, ServerEvent::Pong {});
}
