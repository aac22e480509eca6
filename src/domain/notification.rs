use crate::domain::message::Message;
use crate::domain::offer::Offer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Change pushed to the subscribers of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConversationEvent {
    MessageAppended { message: Message },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: Uuid },
    OfferUpdated { offer: Offer },
    /// The subscriber fell behind. Appended messages are still delivered in
    /// full, but deletions and offer updates in the gap may be missing.
    Resync,
}

impl ConversationEvent {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MessageAppended { .. } => "message_appended",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::OfferUpdated { .. } => "offer_updated",
            Self::Resync => "resync",
        }
    }
}

/// An event addressed to a conversation, as carried over pub/sub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeNotification {
    pub conversation_id: Uuid,
    pub event: ConversationEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_wire_shape() {
        assert_eq!(serde_json::to_value(ConversationEvent::Resync).expect("encode"), serde_json::json!({ "type": "resync" }));
    }
}
