mod support;

use application::{PostMessageRequest, RealtimeSession, ServerEvent};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use domain::UserId;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tower::ServiceExt;

use support::{TestApp, TEST_SECRET};

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn send_text(app: &TestApp, sender: UserId, match_ref: &str, text: &str) -> String {
    app.state
        .messaging
        .send_message(
            PostMessageRequest {
                match_ref: match_ref.to_string(),
                sender_id: sender,
                text: text.to_string(),
                attachments: Vec::new(),
            },
            None,
        )
        .await
        .unwrap()
        .id
        .to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = call(&app.router(), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn api_requires_a_valid_token() {
    let app = TestApp::new();
    let router = app.router();

    let (status, body) = call(&router, "GET", "/api/matches", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");

    let (status, _) = call(&router, "GET", "/api/matches", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 旧的 uid 声明不再被接受
    let legacy = encode(
        &Header::default(),
        &json!({"uid": UserId::generate().to_string(), "exp": 4_102_444_800i64}),
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();
    let (status, _) = call(&router, "GET", "/api/matches", Some(&legacy), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let user_id_claim = encode(
        &Header::default(),
        &json!({"user_id": UserId::generate().to_string(), "exp": 4_102_444_800i64}),
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();
    let (status, body) = call(&router, "GET", "/api/matches", Some(&user_id_claim), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn like_is_idempotent_and_symmetric() {
    let app = TestApp::new();
    let router = app.router();
    let alice = UserId::generate();
    let bob = UserId::generate();

    let uri = format!("/api/matches/likes/like/{bob}");
    let (status, first) = call(&router, "POST", &uri, Some(&app.token_for(alice)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["ok"], true);

    let back = format!("/api/matches/likes/like/{alice}");
    let (_, second) = call(&router, "POST", &back, Some(&app.token_for(bob)), None).await;
    assert_eq!(first["matchId"], second["matchId"]);

    let own = format!("/api/matches/likes/like/{alice}");
    let (status, body) = call(&router, "POST", &own, Some(&app.token_for(alice)), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "self_like");

    let (status, _) = call(
        &router,
        "POST",
        "/api/matches/likes/like/not-a-user",
        Some(&app.token_for(alice)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn messages_unread_counts_and_receipts() {
    let app = TestApp::new();
    let router = app.router();
    let alice = UserId::generate();
    let bob = UserId::generate();
    app.identities.insert(alice, "Alice").await;
    let match_id = app.state.matching.like(alice, bob).await.unwrap().match_id;
    let room = match_id.to_string();

    let mut ids = Vec::new();
    for text in ["first", "second", "third"] {
        ids.push(send_text(&app, alice, &room, text).await);
    }

    let bob_token = app.token_for(bob);
    let (status, rooms) = call(&router, "GET", "/api/matches", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rooms[0]["id"], json!(room));
    assert_eq!(rooms[0]["unreadCount"], 3);
    assert_eq!(rooms[0]["lastMessage"]["text"], "third");
    let names: Vec<_> = rooms[0]["participants"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["displayName"].as_str())
        .collect();
    assert_eq!(names, ["Alice"]);

    let uri = format!("/api/matches/{room}/messages?limit=2");
    let (status, page) = call(&router, "GET", &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<_> = page
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, ["second", "third"]);

    let before = page[0]["createdAt"].as_str().unwrap().to_string();
    let uri = format!(
        "/api/matches/{room}/messages?before={}",
        before.replace('+', "%2B")
    );
    let (_, older) = call(&router, "GET", &uri, Some(&bob_token), None).await;
    assert_eq!(older.as_array().unwrap().len(), 1);
    assert_eq!(older[0]["text"], "first");

    let uri = format!("/api/matches/{room}/read");
    let (status, receipt) = call(
        &router,
        "POST",
        &uri,
        Some(&bob_token),
        Some(json!({"messageIds": [ids[0], ids[1], "not-an-id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt, json!({"ok": true, "updated": 2, "unreadLeft": 1}));

    let (_, again) = call(
        &router,
        "POST",
        &uri,
        Some(&bob_token),
        Some(json!({"messageIds": [ids[0]]})),
    )
    .await;
    assert_eq!(again["updated"], 0);

    let (_, rooms) = call(&router, "GET", "/api/matches", Some(&app.token_for(alice)), None).await;
    assert_eq!(rooms[0]["unreadCount"], 0);
}

#[tokio::test]
async fn invalid_before_is_a_bad_request() {
    let app = TestApp::new();
    let alice = UserId::generate();
    let match_id = app
        .state
        .matching
        .like(alice, UserId::generate())
        .await
        .unwrap()
        .match_id;
    let uri = format!("/api/matches/{match_id}/messages?before=yesterday");
    let (status, _) = call(&app.router(), "GET", &uri, Some(&app.token_for(alice)), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn aliases_work_wherever_ids_do() {
    let app = TestApp::new();
    let router = app.router();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let match_id = app.state.matching.like(alice, bob).await.unwrap().match_id;
    send_text(&app, bob, &match_id.to_string(), "hello").await;

    let alice_token = app.token_for(alice);
    let uri = format!("/api/matches/{match_id}/alias");
    let (status, body) = call(
        &router,
        "PUT",
        &uri,
        Some(&alice_token),
        Some(json!({"alias": "morning-walks"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alias"], "morning-walks");
    assert_eq!(body["matchId"], json!(match_id.to_string()));

    let (status, page) = call(
        &router,
        "GET",
        "/api/matches/morning-walks/messages",
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page[0]["text"], "hello");

    let (status, body) = call(
        &router,
        "GET",
        "/api/matches/evening-walks/messages",
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "match_not_found");

    let (status, _) = call(
        &router,
        "PUT",
        &uri,
        Some(&alice_token),
        Some(json!({"alias": "has spaces"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn outsiders_get_forbidden() {
    let app = TestApp::new();
    let router = app.router();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let match_id = app.state.matching.like(alice, bob).await.unwrap().match_id;
    let outsider = app.token_for(UserId::generate());

    let uri = format!("/api/matches/{match_id}/messages");
    let (status, body) = call(&router, "GET", &uri, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_a_member");

    let uri = format!("/api/matches/{match_id}/read");
    let (status, _) = call(
        &router,
        "POST",
        &uri,
        Some(&outsider),
        Some(json!({"messageIds": []})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = domain::MatchId::generate();
    let uri = format!("/api/matches/{missing}/messages");
    let (status, _) = call(&router, "GET", &uri, Some(&app.token_for(alice)), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_get_structured_errors() {
    let app = TestApp::new();
    let router = app.router();
    let alice = UserId::generate();
    let match_id = app
        .state
        .matching
        .like(alice, UserId::generate())
        .await
        .unwrap()
        .match_id;
    let token = app.token_for(alice);

    let uri = format!("/api/matches/{match_id}/read");
    let (status, body) = call(
        &router,
        "POST",
        &uri,
        Some(&token),
        Some(json!({"messageIds": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
    assert!(body["message"].is_string());

    let uri = format!("/api/matches/{match_id}/messages?limit=abc");
    let (status, body) = call(&router, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");

    let uri = format!("/api/matches/{match_id}/alias");
    let (status, body) = call(&router, "PUT", &uri, Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_argument");
}

#[tokio::test]
async fn read_over_http_is_broadcast_to_the_room() {
    let app = TestApp::new();
    let router = app.router();
    let alice = UserId::generate();
    let bob = UserId::generate();
    let match_id = app.state.matching.like(alice, bob).await.unwrap().match_id;
    let message = send_text(&app, alice, &match_id.to_string(), "fetch").await;

    let (session, mut outbound) = RealtimeSession::open(
        alice,
        app.state.relay.clone(),
        app.state.matching.clone(),
        app.state.messaging.clone(),
    )
    .await;
    session
        .handle_text(&json!({"event": "join", "data": {"matchRef": match_id}}).to_string())
        .await;
    let joined = timeout(Duration::from_secs(1), outbound.recv())
        .await
        .expect("joined in time")
        .expect("queue open");
    assert_eq!(joined.name(), "joined");

    let uri = format!("/api/matches/{match_id}/read");
    let (status, _) = call(
        &router,
        "POST",
        &uri,
        Some(&app.token_for(bob)),
        Some(json!({"messageIds": [message]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let event = timeout(Duration::from_secs(1), outbound.recv())
        .await
        .expect("receipt in time")
        .expect("queue open");
    let ServerEvent::MessagesRead(_) = &event else {
        panic!("expected message:read, got {event:?}");
    };
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({
            "event": "message:read",
            "data": {
                "matchId": match_id.to_string(),
                "readerId": bob.to_string(),
                "messageIds": [message],
            }
        })
    );
}
