use time::OffsetDateTime;
use uuid::Uuid;

/// Client-side delivery state of a message. Never transmitted to other
/// participants; the wire schema has no status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Exactly one payload variant per message. System messages carry text
/// with the `is_system` flag set on the enclosing [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Image { url: String },
    Video { url: String },
    Voice { url: String, duration_secs: i64 },
}

impl MessageBody {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Primary key of the record. Holds the client-generated temporary id
    /// until reconciliation swaps in the server-assigned id.
    pub id: Uuid,
    /// Reconciliation key, stable for the lifetime of one send attempt.
    pub temp_id: Option<Uuid>,
    pub conversation_id: Uuid,
    /// Absent for system messages.
    pub sender: Option<Uuid>,
    pub body: MessageBody,
    /// Users who have acknowledged reading the message. Contains the
    /// sender from creation; insertion order is irrelevant, growth is
    /// additive only.
    pub read_by: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub status: DeliveryStatus,
    pub is_system: bool,
    /// Client-local attachment reference (e.g. a picked photo awaiting
    /// upload). Preserved across reconciliation, never on the wire.
    pub local_attachment: Option<String>,
}

impl Message {
    /// Builds a provisional record for an outgoing send: keyed by a fresh
    /// temporary id, read by the sender, status `Sending`.
    #[must_use]
    pub fn provisional(conversation_id: Uuid, sender: Uuid, body: MessageBody) -> Self {
        let temp_id = Uuid::new_v4();
        Self {
            id: temp_id,
            temp_id: Some(temp_id),
            conversation_id,
            sender: Some(sender),
            body,
            read_by: vec![sender],
            created_at: OffsetDateTime::now_utc(),
            status: DeliveryStatus::Sending,
            is_system: false,
            local_attachment: None,
        }
    }

    #[must_use]
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.contains(&user_id)
    }

    /// Whether this message counts towards `user_id`'s unread total.
    #[must_use]
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        self.sender != Some(user_id) && !self.is_read_by(user_id)
    }
}
