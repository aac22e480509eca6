use crate::domain::conversation::Conversation;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) participant_low: String,
    pub(crate) participant_high: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) last_message_at: Option<OffsetDateTime>,
    pub(crate) last_message_preview: Option<String>,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            participant_low: record.participant_low,
            participant_high: record.participant_high,
            created_at: record.created_at,
            last_message_at: record.last_message_at,
            last_message_preview: record.last_message_preview,
        }
    }
}
