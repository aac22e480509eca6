use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Two distinct participants stored in lexicographic order, so `(a, b)` and
/// `(b, a)` produce the same lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: String,
    high: String,
}

impl ParticipantPair {
    /// Canonicalizes an unordered pair.
    ///
    /// # Errors
    /// Returns `AppError::InvalidParticipants` if either id is blank or both ids are equal.
    pub fn new(a: &str, b: &str) -> Result<Self> {
        if a.trim().is_empty() || b.trim().is_empty() {
            return Err(AppError::InvalidParticipants("participant ids must not be empty".into()));
        }
        if a == b {
            return Err(AppError::InvalidParticipants("a user cannot start a conversation with themself".into()));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low: low.to_string(), high: high.to_string() })
    }

    #[must_use]
    pub fn low(&self) -> &str {
        &self.low
    }

    #[must_use]
    pub fn high(&self) -> &str {
        &self.high
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participant_low: String,
    pub participant_high: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    pub last_message_preview: Option<String>,
}

impl Conversation {
    #[must_use]
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_low == user_id || self.participant_high == user_id
    }

    /// The other participant, if `user_id` belongs to this conversation.
    #[must_use]
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.participant_low == user_id {
            Some(&self.participant_high)
        } else if self.participant_high == user_id {
            Some(&self.participant_low)
        } else {
            None
        }
    }
}
