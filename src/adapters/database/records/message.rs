use crate::domain::message::{Message, OfferPayload};
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: String,
    pub(crate) receiver_id: String,
    pub(crate) content: String,
    pub(crate) offer: Option<Json<OfferPayload>>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.content,
            offer: record.offer.map(|Json(payload)| payload),
            created_at: record.created_at,
        }
    }
}
