use crate::api::schemas::message::{OutgoingMessage, WireMessage};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const ACK_SUCCESS: &str = "success";
pub const ACK_ERROR: &str = "error";

/// A frame travelling client to server. `ack_id` correlates the send
/// with the matching [`ServerEvent::Ack`] reply; events that expect no
/// acknowledgment omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    Message(OutgoingMessage),
    LastOnline(PresenceUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    #[serde(with = "time::serde::rfc3339")]
    pub last_online: OffsetDateTime,
}

/// A frame travelling server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Broadcast of a persisted message to every participant's room,
    /// including the sender's own room.
    Message(WireMessage),
    Ack(AckBody),
    #[serde(rename = "lastOnlineUpdate")]
    LastOnlineUpdate(LastOnlineUpdate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckBody {
    pub status: String,
}

impl AckBody {
    #[must_use]
    pub fn success() -> Self {
        Self { status: ACK_SUCCESS.to_string() }
    }

    #[must_use]
    pub fn error() -> Self {
        Self { status: ACK_ERROR.to_string() }
    }

    /// Anything other than an explicit success body is a send failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ACK_SUCCESS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastOnlineUpdate {
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub last_online: OffsetDateTime,
}
