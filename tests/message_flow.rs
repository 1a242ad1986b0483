//! End-to-end flow against a local websocket server: connect, subscribe,
//! receive an enveloped frame, translate, and post to the paired room.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use interlinked::api::ChatApi;
use interlinked::client::Supervisor;
use interlinked::config::Config;
use interlinked::registry::RoomRegistry;
use interlinked::relay::Relay;
use interlinked::session::SessionManager;
use interlinked::translate::Translator;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic stand-in for the translation provider.
struct TaggingTranslator;

#[async_trait]
impl Translator for TaggingTranslator {
    async fn translate(&self, text: &str, _from: &str, to: &str) -> anyhow::Result<String> {
        Ok(format!("[{to}] {text}"))
    }
}

/// Serve a single websocket connection: push the given frames, then hold
/// the connection open until the client hangs up.
async fn spawn_ws_server(frames: Vec<String>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await
            && let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await
        {
            for frame in frames {
                if ws.send(Message::text(frame)).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(_)) = ws.next().await {}
        }
    });
    format!("ws://{addr}/ws/connect/topic/chat-messages-all/websocket")
}

fn open_frame() -> String {
    "o".to_string()
}

fn connected_frame() -> String {
    let stomp = "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\u{0}";
    format!("a{}", serde_json::Value::Array(vec![stomp.into()]))
}

/// Wrap a payload the way the server does: STOMP MESSAGE frame inside a
/// one-element JSON array, prefixed with the array marker.
fn event_frame(payload: &serde_json::Value) -> String {
    let stomp = format!(
        "MESSAGE\ndestination:/topic/chat-messages-all\ncontent-type:application/json\n\n{payload}\u{0}"
    );
    format!("a{}", serde_json::Value::Array(vec![stomp.into()]))
}

async fn mock_chat_service() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/clearsessions"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/newsession"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "SESSION=sess-e2e"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/roommembership/rooms/private"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"privateRooms": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chatserver/message"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Assemble a supervisor around the mock REST service and the given
/// websocket endpoint, with alpha (English) linked to beta (Spanish).
fn build_supervisor(server: &MockServer, dir: &TempDir, ws_url: String) -> Supervisor {
    let rooms = json!({
        "rooms": [{
            "pairId": "pair-e2e",
            "room1name": "alpha",
            "room2name": "beta",
            "room1lang": "English",
            "room2lang": "Spanish",
        }]
    });
    std::fs::write(dir.path().join("rooms.json"), rooms.to_string()).expect("write rooms");
    std::fs::write(
        dir.path().join("codes.json"),
        json!({"English": "en", "Spanish": "es"}).to_string(),
    )
    .expect("write codes");

    let config = Config {
        api_key: "key-e2e".into(),
        ..Config::default()
    };
    let api = Arc::new(ChatApi::with_client(
        reqwest::Client::new(),
        server.uri(),
        &config,
    ));
    let sessions = Arc::new(SessionManager::new(
        api.clone(),
        dir.path().join("session.json"),
    ));
    let registry = RoomRegistry::new(dir.path().join("rooms.json"), dir.path().join("codes.json"));
    let relay = Relay::new(
        registry,
        Arc::new(TaggingTranslator),
        api.clone(),
        sessions.clone(),
    );
    Supervisor::with_parts(
        ws_url,
        "chatsurferxmppunclass".to_string(),
        "bot-7".to_string(),
        None,
        api,
        sessions,
        relay,
    )
}

/// Poll the mock service until `count` posts have landed on the message
/// endpoint, or the deadline passes.
async fn wait_for_posts(server: &MockServer, count: usize, deadline: Duration) -> Vec<serde_json::Value> {
    let started = std::time::Instant::now();
    loop {
        let posts: Vec<serde_json::Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/api/chatserver/message")
            .map(|r| serde_json::from_slice(&r.body).expect("post body is JSON"))
            .collect();
        if posts.len() >= count || started.elapsed() > deadline {
            return posts;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_room_message_translated_and_posted_to_pair() {
    let server = mock_chat_service().await;
    let dir = TempDir::new().expect("create temp dir");

    let ws_url = spawn_ws_server(vec![
        open_frame(),
        connected_frame(),
        event_frame(&json!({
            "id": "m-1",
            "userId": "u-42",
            "sender": "sam",
            "roomName": "alpha",
            "text": "hello",
            "timestamp": "2024-05-01T12:00:00Z",
            "classification": "UNCLASSIFIED//FOUO",
        })),
    ])
    .await;

    let handle = build_supervisor(&server, &dir, ws_url).spawn();

    let posts = wait_for_posts(&server, 1, Duration::from_secs(5)).await;
    assert_eq!(posts.len(), 1, "expected exactly one relayed post");
    assert_eq!(posts[0]["roomName"], "beta");
    assert_eq!(posts[0]["message"], "[es] hello");
    assert_eq!(posts[0]["nickName"], "sam (from Google Translate)");

    assert!(handle.stop().await);
}

#[tokio::test]
async fn test_own_and_unlinked_messages_are_not_relayed() {
    let server = mock_chat_service().await;
    let dir = TempDir::new().expect("create temp dir");

    // A loop-back from the bot itself, then a room nobody linked, then a
    // real one. Only the last may reach the message endpoint.
    let ws_url = spawn_ws_server(vec![
        open_frame(),
        connected_frame(),
        event_frame(&json!({
            "userId": "bot-7",
            "sender": "relay-bot",
            "roomName": "alpha",
            "text": "hola (from Google Translate)",
        })),
        event_frame(&json!({
            "userId": "u-9",
            "sender": "kim",
            "roomName": "unlinked-room",
            "text": "anyone here?",
        })),
        event_frame(&json!({
            "userId": "u-9",
            "sender": "kim",
            "roomName": "beta",
            "text": "hola",
        })),
    ])
    .await;

    let handle = build_supervisor(&server, &dir, ws_url).spawn();

    let posts = wait_for_posts(&server, 1, Duration::from_secs(5)).await;
    assert_eq!(posts.len(), 1);
    // beta routes back to alpha, Spanish to English.
    assert_eq!(posts[0]["roomName"], "alpha");
    assert_eq!(posts[0]["message"], "[en] hola");

    assert!(handle.stop().await);
}

#[tokio::test]
async fn test_stop_while_listening_returns_promptly() {
    let server = mock_chat_service().await;
    let dir = TempDir::new().expect("create temp dir");

    // Idle server: the client sits in its receive tick.
    let ws_url = spawn_ws_server(vec![open_frame(), connected_frame()]).await;
    let handle = build_supervisor(&server, &dir, ws_url).spawn();

    // Give it time to connect and settle into listening.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!handle.is_finished());

    let started = std::time::Instant::now();
    assert!(handle.stop().await, "listener should stop gracefully");
    // One receive tick plus slack, not the full stop timeout.
    assert!(started.elapsed() < Duration::from_secs(3));

    // No reconnect after cancellation: the session endpoint was hit once.
    let session_calls = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/api/auth/newsession")
        .count();
    assert_eq!(session_calls, 1);
}
