use crate::domain::Conversation;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    pub id: Uuid,
    pub creator: Uuid,
    pub participants: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Conversation> for WireConversation {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id,
            creator: conversation.creator,
            participants: conversation.participants.clone(),
            chat_name: conversation.chat_name.clone(),
            created_at: conversation.created_at,
        }
    }
}

impl From<WireConversation> for Conversation {
    fn from(wire: WireConversation) -> Self {
        Self {
            id: wire.id,
            creator: wire.creator,
            participants: wire.participants,
            chat_name: wire.chat_name,
            created_at: wire.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConversationRequest {
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUsersRequest {
    pub conversation_id: Uuid,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameChatRequest {
    pub conversation_id: Uuid,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub conversation_id: Uuid,
}
