use crate::api::schemas::WireMessage;
use crate::error::Result;
use crate::storage::records::{parse_uuid, parse_uuid_list, timestamp_from_millis};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender: Option<String>,
    pub temp_id: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub voice_message: Option<String>,
    pub duration: Option<i64>,
    pub read_by: String,
    pub is_system: bool,
    pub created_at: i64,
}

impl MessageRecord {
    pub(crate) fn into_wire(self) -> Result<WireMessage> {
        Ok(WireMessage {
            id: parse_uuid(&self.id)?,
            conversation_id: parse_uuid(&self.conversation_id)?,
            sender: self.sender.as_deref().map(parse_uuid).transpose()?,
            temp_id: self.temp_id.as_deref().map(parse_uuid).transpose()?,
            text: self.text,
            image: self.image,
            video: self.video,
            voice_message: self.voice_message,
            duration: self.duration,
            read_by: parse_uuid_list(&self.read_by)?,
            created_at: timestamp_from_millis(self.created_at)?,
            is_system_message: self.is_system,
        })
    }
}
