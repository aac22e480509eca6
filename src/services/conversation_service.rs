use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::page::Page;
use crate::error::{AppError, Result};
use crate::services::ports::ConversationStore;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            created_total: meter
                .u64_counter("bazaar_conversations_created_total")
                .with_description("Conversations resolved by find-or-create, by outcome")
                .build(),
        }
    }
}

/// Resolves unordered participant pairs to their single conversation.
#[derive(Clone, Debug)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    metrics: Metrics,
}

impl ConversationService {
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store, metrics: Metrics::new() }
    }

    /// Returns the conversation between `a` and `b`, creating it if needed.
    ///
    /// Concurrent callers converge: the loser of the insert race re-reads and
    /// returns the winner's row.
    ///
    /// # Errors
    /// Returns `AppError::InvalidParticipants` if either id is blank or both are equal.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn find_or_create(&self, a: &str, b: &str) -> Result<Conversation> {
        let pair = ParticipantPair::new(a, b)?;

        if let Some(existing) = self.store.find_by_pair(&pair).await? {
            self.metrics.created_total.add(1, &[KeyValue::new("outcome", "existing")]);
            return Ok(existing);
        }

        match self.store.insert(&pair).await {
            Ok(created) => {
                tracing::info!(conversation_id = %created.id, "Conversation created");
                self.metrics.created_total.add(1, &[KeyValue::new("outcome", "created")]);
                Ok(created)
            }
            Err(AppError::Conflict(_)) => {
                tracing::debug!("Lost conversation insert race, re-reading winner");
                self.metrics.created_total.add(1, &[KeyValue::new("outcome", "raced")]);
                self.store.find_by_pair(&pair).await?.ok_or_else(|| {
                    tracing::error!("Conversation vanished after a uniqueness conflict");
                    AppError::Internal
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Canonical lookup that never creates.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the pair has no conversation.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn find(&self, a: &str, b: &str) -> Result<Conversation> {
        let pair = ParticipantPair::new(a, b)?;
        self.store.find_by_pair(&pair).await?.ok_or(AppError::NotFound)
    }

    /// # Errors
    /// Returns `AppError::ConversationNotFound` if absent and
    /// `AppError::Unauthorized` if `requester` is not a participant.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn get(&self, id: Uuid, requester: &str) -> Result<Conversation> {
        let conversation = self.store.get(id).await?.ok_or(AppError::ConversationNotFound)?;
        if !conversation.has_participant(requester) {
            return Err(AppError::Unauthorized);
        }
        Ok(conversation)
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn list_for_user(&self, user_id: &str, page: Page) -> Result<Vec<Conversation>> {
        self.store.list_for_user(user_id, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;

    fn service() -> ConversationService {
        ConversationService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_find_or_create_is_direction_independent() {
        let service = service();
        let first = service.find_or_create("u1", "u2").await.expect("create");
        let second = service.find_or_create("u2", "u1").await.expect("find");

        assert_eq!(first.id, second.id);
        assert_eq!(first.participant_low, "u1");
        assert_eq!(first.participant_high, "u2");
        assert!(first.last_message_at.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_converges() {
        let service = service();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        service.find_or_create("alice", "bob").await
                    } else {
                        service.find_or_create("bob", "alice").await
                    }
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join").expect("find_or_create").id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "every caller must see the same conversation");
    }

    #[tokio::test]
    async fn test_invalid_participants() {
        let service = service();
        assert!(matches!(service.find_or_create("u1", "u1").await, Err(AppError::InvalidParticipants(_))));
        assert!(matches!(service.find_or_create("", "u1").await, Err(AppError::InvalidParticipants(_))));
    }

    #[tokio::test]
    async fn test_find_never_creates() {
        let service = service();
        assert!(matches!(service.find("u1", "u2").await, Err(AppError::NotFound)));
        assert!(service.list_for_user("u1", Page::default()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_get_checks_membership() {
        let service = service();
        let conversation = service.find_or_create("u1", "u2").await.expect("create");

        assert!(service.get(conversation.id, "u2").await.is_ok());
        assert!(matches!(service.get(conversation.id, "u3").await, Err(AppError::Unauthorized)));
        assert!(matches!(service.get(Uuid::new_v4(), "u1").await, Err(AppError::ConversationNotFound)));
    }
}
