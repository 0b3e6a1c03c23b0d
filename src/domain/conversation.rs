use time::OffsetDateTime;
use uuid::Uuid;

pub const MAX_CHAT_NAME_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub creator: Uuid,
    /// Participant set; order is irrelevant except that the creator comes
    /// first at creation time. Grows via `addUsers`, never shrinks.
    pub participants: Vec<Uuid>,
    pub chat_name: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Conversation {
    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}

/// Canonical lookup key for a participant set: sorted, deduplicated,
/// hyphenated uuids joined by `,`. A unique index on this key makes
/// resolve-or-create atomic under concurrent first contact.
#[must_use]
pub fn participants_key(participants: &[Uuid]) -> String {
    let mut ids: Vec<Uuid> = participants.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
}
