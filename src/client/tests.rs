use super::*;
use crate::config::Config;
use crate::registry::RoomRegistry;
use crate::translate::Translator;
use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_subscriptions_cover_static_topics_then_private_rooms() {
    let rooms = vec!["ops".to_string(), "translators".to_string()];
    let subscriptions = build_subscriptions("chatsurferxmppunclass", &rooms);

    assert_eq!(subscriptions.len(), 5);
    assert_eq!(subscriptions[0].destination, "/topic/chat-messages-all");
    assert_eq!(subscriptions[1].destination, "/user/topic/direct-message");
    assert_eq!(
        subscriptions[2].destination,
        "/user/topic/room-membership-changed-event"
    );
    assert_eq!(
        subscriptions[3].destination,
        "/topic/chat-messages-room/chatsurferxmppunclass/ops"
    );
    assert_eq!(
        subscriptions[4].destination,
        "/topic/chat-messages-room/chatsurferxmppunclass/translators"
    );
}

#[test]
fn test_subscription_ids_sequential_from_zero_and_unique() {
    let rooms: Vec<String> = (0..10).map(|i| format!("room-{i}")).collect();
    let subscriptions = build_subscriptions("d", &rooms);
    for (expected, subscription) in subscriptions.iter().enumerate() {
        assert_eq!(subscription.id, expected as u64);
    }
}

#[tokio::test]
async fn test_wait_with_cancel_observes_flag() {
    let stop = AtomicBool::new(true);
    let started = std::time::Instant::now();
    assert!(wait_with_cancel(&stop, Duration::from_secs(30)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_wait_with_cancel_elapses_without_flag() {
    let stop = AtomicBool::new(false);
    assert!(!wait_with_cancel(&stop, Duration::from_millis(300)).await);
}

struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str, _from: &str, _to: &str) -> anyhow::Result<String> {
        Ok(text.to_string())
    }
}

async fn unreachable_supervisor() -> (MockServer, tempfile::TempDir, Supervisor) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/clearsessions"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/newsession"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "SESSION=s-1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/roommembership/rooms/private"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"privateRooms": []})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        api_key: "key-1".into(),
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
    let relay = Relay::new(
        RoomRegistry::new(dir.path().join("rooms.json"), dir.path().join("codes.json")),
        Arc::new(NoopTranslator),
        api.clone(),
        sessions.clone(),
    );

    // Nothing listens on this port — the connect attempt fails fast and
    // the supervisor enters its reconnect backoff.
    let supervisor = Supervisor::with_parts(
        "ws://127.0.0.1:9/ws".to_string(),
        "chatsurferxmppunclass".to_string(),
        "bot-id".to_string(),
        None,
        api,
        sessions,
        relay,
    );
    (server, dir, supervisor)
}

#[tokio::test]
async fn test_cancellation_during_reconnect_backoff_terminates() {
    let (_server, _dir, supervisor) = unreachable_supervisor().await;
    let handle = supervisor.spawn();

    // Let it fail the first connect and settle into the 10s backoff.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!handle.is_finished());

    let started = std::time::Instant::now();
    assert!(handle.stop().await, "task should stop gracefully");
    // Well under the 10s backoff: the wait polls the flag.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_stop_before_start_exits_immediately() {
    let (_server, _dir, supervisor) = unreachable_supervisor().await;
    let handle = supervisor.spawn();
    assert!(handle.stop().await);
}
