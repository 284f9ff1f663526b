use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tokio::time;
use tokio_tungstenite::tungstenite;

use buzzchat_gateway::auth::Claims;
use buzzchat_gateway::config::Config;
use buzzchat_gateway::gateway::registry::ConnectionRegistry;
use buzzchat_gateway::log::memory::MemoryLog;
use buzzchat_gateway::log::EventLog;
use buzzchat_gateway::presence::PresenceCoordinator;
use buzzchat_gateway::store::directory::{GroupDirectory, MemoryDirectory};
use buzzchat_gateway::store::kv::{MemoryStore, PresenceStore};
use buzzchat_gateway::store::messages::{MemoryMessages, MessageStore, StoredMessage};
use buzzchat_gateway::{gateway, persist, router, AppState};

pub const TEST_SECRET: &str = "gateway-test-secret";

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// The shared services every gateway instance of a test fleet talks to: one
/// event log, one presence store, one group directory, one message store.
pub struct TestCluster {
    pub log: Arc<MemoryLog>,
    pub presence_store: Arc<MemoryStore>,
    pub groups: Arc<MemoryDirectory>,
    pub messages: Arc<MemoryMessages>,
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            log: Arc::new(MemoryLog::new()),
            presence_store: Arc::new(MemoryStore::new()),
            groups: Arc::new(MemoryDirectory::new()),
            messages: Arc::new(MemoryMessages::new()),
        }
    }

    /// Start one gateway instance against the cluster's shared services: a
    /// real TCP server on a random port, its own registry and consumer group,
    /// plus the two shared-group writer roles. Subscriptions are established
    /// before this returns, so events published afterwards are never missed.
    pub async fn spawn_instance(&self) -> (SocketAddr, AppState) {
        let config = Config {
            jwt_secret: TEST_SECRET.to_string(),
            port: 0,
            instance_id: buzzchat_common::id::prefixed_ulid(buzzchat_common::id::prefix::GATEWAY),
            worker_id: 0,
        };

        let log: Arc<dyn EventLog> = self.log.clone();
        let presence_store: Arc<dyn PresenceStore> = self.presence_store.clone();
        let groups: Arc<dyn GroupDirectory> = self.groups.clone();
        let messages: Arc<dyn MessageStore> = self.messages.clone();

        let state = AppState {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            presence: Arc::new(PresenceCoordinator::new(presence_store)),
            log,
            groups,
            messages,
            snowflake: Arc::new(buzzchat_common::SnowflakeGenerator::new(0)),
        };

        let fanout = gateway::consumer::subscribe(&state).await.expect("fan-out sub");
        let routing = router::subscribe(&state).await.expect("router sub");
        let writing = persist::subscribe(&state).await.expect("persist sub");
        tokio::spawn(gateway::consumer::drive(state.clone(), fanout));
        tokio::spawn(router::drive(state.clone(), routing));
        tokio::spawn(persist::drive(state.clone(), writing));

        let app = gateway::server::router().with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, state)
    }

    /// Poll the message store until the group holds exactly `count` messages.
    pub async fn wait_for_message_count(&self, group_id: &str, count: usize) -> Vec<StoredMessage> {
        let deadline = time::Instant::now() + Duration::from_secs(2);
        loop {
            let messages = self.messages.group_messages(group_id).await.unwrap();
            if messages.len() == count {
                return messages;
            }
            if time::Instant::now() > deadline {
                panic!(
                    "expected {count} stored messages for {group_id}, have {}",
                    messages.len()
                );
            }
            time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn mint_token(user_id: &str) -> String {
    mint_token_with_exp(user_id, chrono::Utc::now().timestamp() + 3600)
}

pub fn mint_token_with_exp(user_id: &str, exp: i64) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
        iat: chrono::Utc::now().timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Open a WebSocket to the gateway, optionally with a token on the upgrade
/// request. No frames are consumed.
pub async fn connect_raw(addr: SocketAddr, token: Option<&str>) -> WsStream {
    let url = match token {
        Some(token) => format!("ws://{addr}/gateway?token={token}"),
        None => format!("ws://{addr}/gateway"),
    };
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Connect as `user_id` and consume the initial `user.groups.status` sync
/// frame every authenticated connection receives.
pub async fn connect(addr: SocketAddr, user_id: &str) -> WsStream {
    let token = mint_token(user_id);
    let mut ws = connect_raw(addr, Some(&token)).await;
    recv_event(&mut ws, "user.groups.status").await;
    ws
}

pub async fn send_event(ws: &mut WsStream, event: &str, data: serde_json::Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// Read the next text frame, assert its event name, and return its data.
pub async fn recv_event(ws: &mut WsStream, event: &str) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {event}"))
        .expect("stream ended")
        .expect("ws read error");

    let text = msg.into_text().expect("not text");
    let frame: serde_json::Value = serde_json::from_str(&text).expect("parse frame");
    assert_eq!(frame["event"], event, "unexpected frame: {frame}");
    frame["data"].clone()
}

/// Assert that no frame arrives within a short grace period.
pub async fn expect_silence(ws: &mut WsStream) {
    match time::timeout(Duration::from_millis(200), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(msg))) => panic!("expected no frame, got: {msg:?}"),
        Ok(Some(Err(err))) => panic!("ws read error: {err}"),
        Ok(None) => panic!("stream ended unexpectedly"),
    }
}

/// Assert the next frame is a close with the given application code.
pub async fn expect_close(ws: &mut WsStream, code: u16) {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");

    match msg {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(code)
            );
        }
        tungstenite::Message::Close(None) => {
            // Also acceptable.
        }
        other => {
            panic!("Expected Close frame, got: {other:?}");
        }
    }
}
