#![allow(dead_code)]

use async_trait::async_trait;
use driftchat::api::schemas::{
    AckBody, ClientFrame, OutgoingMessage, ServerFrame, WireConversation, WireMessage,
};
use driftchat::client::{ChannelEvent, ChannelState, DeliveryApi, RealtimeChannel, SyncError};
use driftchat::config::{AuthConfig, Config, LogFormat, MessagingConfig, ServerConfig, TelemetryConfig, WsConfig};
use driftchat::services::auth::sign_jwt;
use driftchat::storage::{self, DbPool, user_repo::UserRepository};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

static INIT: Once = Once::new();

pub const TEST_JWT_SECRET: &str = "test_secret";

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("driftchat=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn get_test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, shutdown_timeout_secs: 2 },
        auth: AuthConfig { jwt_secret: TEST_JWT_SECRET.to_string() },
        messaging: MessagingConfig { history_page_size: 30, history_page_limit: 100 },
        websocket: WsConfig { outbound_buffer_size: 32, room_capacity: 64 },
        telemetry: TelemetryConfig { log_format: LogFormat::Text },
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub client: reqwest::Client,
    pub pool: DbPool,
    shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        setup_tracing();

        let pool = storage::init_pool(&config.database_url).await.expect("Failed to open test database");
        storage::run_migrations(&pool).await.expect("Failed to run migrations");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let services = driftchat::build_services(&config, pool.clone(), None);
        let router = driftchat::api::app_router(config, services, shutdown_rx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let mut serve_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = serve_rx.wait_for(|&s| s).await;
                })
                .await
                .expect("Test server failed");
        });

        Self {
            server_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/gateway"),
            client: reqwest::Client::new(),
            pool,
            shutdown_tx,
        }
    }

    /// Provisions a user row directly (account creation is not part of
    /// the delivery server) and mints a valid token for it.
    pub async fn seed_user(&self, username: &str) -> TestUser {
        let id = Uuid::new_v4();
        UserRepository::new(self.pool.clone()).create(id, username).await.expect("Failed to seed user");
        let token = sign_jwt(id, TEST_JWT_SECRET).expect("Failed to sign test token");
        TestUser { id, username: username.to_string(), token }
    }

    pub async fn connect_ws(&self, token: &str) -> WsClient {
        let url = format!("{}?token={}", self.ws_url, token);
        let (stream, _) = connect_async(url).await.expect("WebSocket connect failed");
        WsClient { stream }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send_frame(&mut self, frame: &ClientFrame) {
        let json = serde_json::to_string(frame).expect("Failed to encode frame");
        self.stream.send(TungsteniteMessage::Text(json.into())).await.expect("Failed to send frame");
    }

    /// Next decoded frame, skipping control messages. None on timeout or
    /// close.
    pub async fn recv_frame(&mut self, timeout: Duration) -> Option<ServerFrame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.stream.next()).await.ok()??;
            match msg {
                Ok(TungsteniteMessage::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).expect("Failed to decode frame"));
                }
                Ok(TungsteniteMessage::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

pub fn generate_username(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// Scripted ack behavior for [`FakeChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckScript {
    Success,
    Error,
    /// The ack never arrives; the caller's timeout decides.
    Never,
}

/// In-memory channel for synchronizer tests: scripted acks, manual state
/// transitions, test-driven broadcasts.
#[derive(Debug)]
pub struct FakeChannel {
    state_tx: watch::Sender<ChannelState>,
    events_tx: broadcast::Sender<ChannelEvent>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
    ack: Mutex<AckScript>,
}

impl FakeChannel {
    pub fn new(state: ChannelState) -> Self {
        let (state_tx, _) = watch::channel(state);
        let (events_tx, _) = broadcast::channel(64);
        Self { state_tx, events_tx, sent: Mutex::new(Vec::new()), ack: Mutex::new(AckScript::Success) }
    }

    pub fn script_ack(&self, script: AckScript) {
        *self.ack.lock().unwrap() = script;
    }

    pub fn set_state(&self, state: ChannelState) {
        let _ = self.state_tx.send_replace(state);
        let _ = self.events_tx.send(ChannelEvent::StateChanged(state));
    }

    pub fn push_event(&self, event: ChannelEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    async fn send(&self, outgoing: OutgoingMessage) -> Result<AckBody, SyncError> {
        self.sent.lock().unwrap().push(outgoing);
        let script = *self.ack.lock().unwrap();
        match script {
            AckScript::Success => Ok(AckBody::success()),
            AckScript::Error => Ok(AckBody::error()),
            AckScript::Never => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn send_presence(&self, _last_online: OffsetDateTime) -> Result<(), SyncError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }
}

/// In-memory delivery API for synchronizer tests. `fail_mark_read`
/// simulates a server that errors on the read-receipt round trip.
#[derive(Debug, Default)]
pub struct FakeApi {
    pub unread: Mutex<Vec<WireMessage>>,
    pub mark_read_calls: Mutex<Vec<Uuid>>,
    pub fail_mark_read: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unread(&self, messages: Vec<WireMessage>) {
        *self.unread.lock().unwrap() = messages;
    }
}

#[async_trait]
impl DeliveryApi for FakeApi {
    async fn fetch_unread(&self) -> Result<Vec<WireMessage>, SyncError> {
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn mark_read(&self, conversation_id: Uuid) -> Result<(), SyncError> {
        self.mark_read_calls.lock().unwrap().push(conversation_id);
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(SyncError::Api { status: 500, message: "simulated outage".to_string() });
        }
        Ok(())
    }

    async fn download_chat_history(&self, _conversation_id: Uuid) -> Result<Vec<WireMessage>, SyncError> {
        Ok(Vec::new())
    }

    async fn fetch_history(
        &self,
        _conversation_id: Uuid,
        _page: i64,
        _limit: i64,
    ) -> Result<Vec<WireMessage>, SyncError> {
        Ok(Vec::new())
    }

    async fn resolve_conversation(&self, _participants: Vec<Uuid>) -> Result<WireConversation, SyncError> {
        Err(SyncError::Api { status: 404, message: "not scripted".to_string() })
    }

    async fn fetch_conversations(&self) -> Result<Vec<WireConversation>, SyncError> {
        Ok(Vec::new())
    }

    async fn add_users(&self, _conversation_id: Uuid, _user_ids: Vec<Uuid>) -> Result<WireConversation, SyncError> {
        Err(SyncError::Api { status: 404, message: "not scripted".to_string() })
    }

    async fn rename_group_chat(
        &self,
        _conversation_id: Uuid,
        _new_name: String,
    ) -> Result<WireConversation, SyncError> {
        Err(SyncError::Api { status: 404, message: "not scripted".to_string() })
    }
}

/// A wire message as the server would broadcast it.
pub fn wire_text_message(conversation_id: Uuid, sender: Uuid, temp_id: Option<Uuid>, text: &str) -> WireMessage {
    WireMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender: Some(sender),
        temp_id,
        text: Some(text.to_string()),
        image: None,
        video: None,
        voice_message: None,
        duration: None,
        read_by: vec![sender],
        created_at: OffsetDateTime::now_utc(),
        is_system_message: false,
    }
}
