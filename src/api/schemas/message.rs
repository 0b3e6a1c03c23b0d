use crate::domain::{DeliveryStatus, Message, MessageBody};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted message as it travels over the wire (broadcast frames and
/// every HTTP message endpoint). Exactly one of the payload fields is
/// set. Delivery status and local attachment references never leave the
/// client, so they have no field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub read_by: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub is_system_message: bool,
}

impl WireMessage {
    /// Extracts the payload, taking the first populated field in the
    /// precedence order text, video, image, voice.
    #[must_use]
    pub fn body(&self) -> Option<MessageBody> {
        if let Some(text) = self.text.as_ref().filter(|t| !t.is_empty()) {
            Some(MessageBody::Text(text.clone()))
        } else if let Some(video) = self.video.as_ref().filter(|v| !v.is_empty()) {
            Some(MessageBody::Video { url: video.clone() })
        } else if let Some(image) = self.image.as_ref().filter(|i| !i.is_empty()) {
            Some(MessageBody::Image { url: image.clone() })
        } else if let Some(voice) = self.voice_message.as_ref().filter(|v| !v.is_empty()) {
            let duration_secs = self.duration.unwrap_or_default();
            (duration_secs > 0).then(|| MessageBody::Voice { url: voice.clone(), duration_secs })
        } else {
            None
        }
    }

    /// Converts into a domain record with the given client-side status.
    /// Returns `None` when no payload field is populated.
    #[must_use]
    pub fn into_message(self, status: DeliveryStatus) -> Option<Message> {
        let body = self.body()?;
        Some(Message {
            id: self.id,
            temp_id: self.temp_id,
            conversation_id: self.conversation_id,
            sender: self.sender,
            body,
            read_by: self.read_by,
            created_at: self.created_at,
            status,
            is_system: self.is_system_message,
            local_attachment: None,
        })
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let mut wire = Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: message.sender,
            temp_id: message.temp_id,
            text: None,
            image: None,
            video: None,
            voice_message: None,
            duration: None,
            read_by: message.read_by.clone(),
            created_at: message.created_at,
            is_system_message: message.is_system,
        };
        match &message.body {
            MessageBody::Text(text) => wire.text = Some(text.clone()),
            MessageBody::Image { url } => wire.image = Some(url.clone()),
            MessageBody::Video { url } => wire.video = Some(url.clone()),
            MessageBody::Voice { url, duration_secs } => {
                wire.voice_message = Some(url.clone());
                wire.duration = Some(*duration_secs);
            }
        }
        wire
    }
}

/// A client-submitted send, carried in the realtime `Message` event. The
/// server assigns the id and timestamp; `temp_id` is echoed back so the
/// sender can reconcile its provisional record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub temp_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn new(conversation_id: Uuid, sender: Uuid, temp_id: Uuid, body: &MessageBody) -> Self {
        let mut out = Self {
            conversation_id,
            sender,
            temp_id,
            text: None,
            image: None,
            video: None,
            voice_message: None,
            duration: None,
        };
        match body {
            MessageBody::Text(text) => out.text = Some(text.clone()),
            MessageBody::Image { url } => out.image = Some(url.clone()),
            MessageBody::Video { url } => out.video = Some(url.clone()),
            MessageBody::Voice { url, duration_secs } => {
                out.voice_message = Some(url.clone());
                out.duration = Some(*duration_secs);
            }
        }
        out
    }

    /// Validates and extracts the payload: exactly the same precedence as
    /// [`WireMessage::body`], with voice requiring a positive duration.
    #[must_use]
    pub fn body(&self) -> Option<MessageBody> {
        if let Some(text) = self.text.as_ref().filter(|t| !t.is_empty()) {
            Some(MessageBody::Text(text.clone()))
        } else if let Some(video) = self.video.as_ref().filter(|v| !v.is_empty()) {
            Some(MessageBody::Video { url: video.clone() })
        } else if let Some(image) = self.image.as_ref().filter(|i| !i.is_empty()) {
            Some(MessageBody::Image { url: image.clone() })
        } else if let Some(voice) = self.voice_message.as_ref().filter(|v| !v.is_empty()) {
            let duration_secs = self.duration.unwrap_or_default();
            (duration_secs > 0).then(|| MessageBody::Voice { url: voice.clone(), duration_secs })
        } else {
            None
        }
    }
}
