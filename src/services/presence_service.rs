use crate::api::schemas::{LastOnlineUpdate, ServerEvent};
use crate::error::{AppError, Result};
use crate::services::rooms::RoomRegistry;
use crate::storage::conversation_repo::ConversationRepository;
use crate::storage::user_repo::UserRepository;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Last-online presence: stores the timestamp and notifies everyone who
/// shares a conversation with the user.
#[derive(Clone, Debug)]
pub struct PresenceService {
    users: UserRepository,
    conversations: ConversationRepository,
    rooms: Arc<RoomRegistry>,
}

impl PresenceService {
    #[must_use]
    pub fn new(users: UserRepository, conversations: ConversationRepository, rooms: Arc<RoomRegistry>) -> Self {
        Self { users, conversations, rooms }
    }

    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn update_last_online(&self, user_id: Uuid, last_online: OffsetDateTime) -> Result<()> {
        if self.users.set_last_online(user_id, last_online).await? == 0 {
            return Err(AppError::NotFound);
        }

        let mut notified = HashSet::new();
        let event = ServerEvent::LastOnlineUpdate(LastOnlineUpdate { user_id, last_online });
        for conversation in self.conversations.for_user(user_id).await? {
            for &participant in &conversation.participants {
                if notified.insert(participant) {
                    self.rooms.publish(participant, &event);
                }
            }
        }

        Ok(())
    }

    pub async fn last_online(&self, user_id: Uuid) -> Result<Option<OffsetDateTime>> {
        self.users.last_online(user_id).await
    }
}
