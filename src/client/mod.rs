use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod api;
pub mod channel;
pub mod store;
pub mod synchronizer;
pub mod ws;

pub use api::{DeliveryApi, HttpDeliveryApi};
pub use channel::{ChannelEvent, ChannelState, RealtimeChannel};
pub use store::MessageStore;
pub use synchronizer::Synchronizer;
pub use ws::WsChannel;

/// Everything a session needs, passed explicitly at construction. There
/// is no ambient global configuration; components receive this value and
/// nothing else.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: Uuid,
    pub auth_token: String,
    /// Base URL of the delivery server's HTTP endpoints.
    pub base_url: String,
    /// WebSocket URL of the realtime gateway.
    pub ws_url: String,
    /// How long a send waits for its acknowledgment before the record is
    /// marked failed.
    pub ack_timeout: Duration,
}

impl Session {
    #[must_use]
    pub fn new(user_id: Uuid, auth_token: String, base_url: String, ws_url: String) -> Self {
        Self { user_id, auth_token, base_url, ws_url, ack_timeout: Duration::from_secs(5) }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Channel is not connected")]
    NotConnected,
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Acknowledgment timed out")]
    AckTimeout,
    #[error("Send rejected by server")]
    SendRejected,
    #[error("Server error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Corrupt cache record: {0}")]
    Corrupt(String),
    #[error("No such message: {0}")]
    MissingRecord(Uuid),
}

pub type Result<T> = std::result::Result<T, SyncError>;
