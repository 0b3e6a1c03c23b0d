use crate::domain::Conversation;
use crate::error::Result;
use crate::storage::records::{parse_uuid, parse_uuid_list, timestamp_from_millis};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ConversationRecord {
    pub id: String,
    pub creator: String,
    pub chat_name: Option<String>,
    pub participants: String,
    pub created_at: i64,
}

impl ConversationRecord {
    pub(crate) fn into_domain(self) -> Result<Conversation> {
        Ok(Conversation {
            id: parse_uuid(&self.id)?,
            creator: parse_uuid(&self.creator)?,
            participants: parse_uuid_list(&self.participants)?,
            chat_name: self.chat_name,
            created_at: timestamp_from_millis(self.created_at)?,
        })
    }
}
