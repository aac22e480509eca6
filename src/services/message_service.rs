use crate::config::MessagingConfig;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::message::{self, Message, NewMessage, OfferPayload};
use crate::domain::notification::ConversationEvent;
use crate::domain::page::Page;
use crate::error::{AppError, Result};
use crate::services::feed::ConversationFeed;
use crate::services::notification::ChangeNotifier;
use crate::services::ports::{ConversationStore, MessageStore};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) appended_total: Counter<u64>,
    pub(crate) feed_batch_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            appended_total: meter
                .u64_counter("bazaar_messages_appended_total")
                .with_description("Message append attempts by outcome")
                .build(),
            feed_batch_size: meter
                .u64_histogram("bazaar_feed_batch_size")
                .with_description("Messages pulled in one realtime feed batch")
                .build(),
        }
    }
}

/// What a caller asks to append; the sender comes from the authenticated identity.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub conversation_id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub offer: Option<OfferPayload>,
}

/// Ordered, append-only message log per conversation.
#[derive(Clone, Debug)]
pub struct MessageService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    notifier: Arc<dyn ChangeNotifier>,
    config: MessagingConfig,
    pub(crate) metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        notifier: Arc<dyn ChangeNotifier>,
        config: MessagingConfig,
    ) -> Self {
        Self { conversations, messages, notifier, config, metrics: Metrics::new() }
    }

    async fn conversation(&self, id: Uuid) -> Result<Conversation> {
        self.conversations.get(id).await?.ok_or(AppError::ConversationNotFound)
    }

    async fn conversation_for(&self, id: Uuid, user_id: &str) -> Result<Conversation> {
        let conversation = self.conversation(id).await?;
        if !conversation.has_participant(user_id) {
            return Err(AppError::Unauthorized);
        }
        Ok(conversation)
    }

    /// Appends a message and refreshes the conversation summary in one store
    /// transaction, then notifies subscribers.
    ///
    /// # Errors
    /// Returns `AppError::ConversationNotFound` if the conversation does not exist.
    /// Returns `AppError::Unauthorized` if the sender is not a participant.
    /// Returns `AppError::InvalidArgument` if the receiver is not the other
    /// participant or the content is empty without an offer or too long.
    /// Returns `AppError::InvalidOffer` if the offer payload is half-formed.
    #[tracing::instrument(
        err(level = "debug"),
        skip(self, request),
        fields(conversation_id = %request.conversation_id, has_offer = request.offer.is_some())
    )]
    pub async fn append(&self, request: AppendRequest) -> Result<Message> {
        let result = self.append_inner(request).await;
        let status = if result.is_ok() { "success" } else { "rejected" };
        self.metrics.appended_total.add(1, &[KeyValue::new("status", status)]);
        result
    }

    async fn append_inner(&self, request: AppendRequest) -> Result<Message> {
        let conversation = self.conversation_for(request.conversation_id, &request.sender_id).await?;

        if conversation.counterpart(&request.sender_id) != Some(request.receiver_id.as_str()) {
            return Err(AppError::invalid("receiver must be the other participant"));
        }
        message::validate_content(&request.content, request.offer.is_some(), self.config.max_content_chars)?;
        if let Some(offer) = &request.offer {
            offer.validate()?;
        }

        let preview = message::preview(&request.content, request.offer.as_ref(), self.config.preview_max_chars);
        let stored = self
            .messages
            .append(
                NewMessage {
                    conversation_id: request.conversation_id,
                    sender_id: request.sender_id,
                    receiver_id: request.receiver_id,
                    content: request.content,
                    offer: request.offer,
                },
                preview,
            )
            .await?;

        tracing::debug!(message_id = %stored.id, "Message appended");
        self.notifier
            .publish(stored.conversation_id, ConversationEvent::MessageAppended { message: stored.clone() })
            .await;

        Ok(stored)
    }

    /// Messages of a conversation, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::ConversationNotFound` or `AppError::Unauthorized`.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn list(&self, conversation_id: Uuid, requester: &str, page: Page) -> Result<Vec<Message>> {
        self.conversation_for(conversation_id, requester).await?;
        self.messages.list(conversation_id, page).await
    }

    /// Messages exchanged between `requester` and `peer`, oldest first. Never
    /// creates a conversation.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the two have never talked and
    /// `AppError::InvalidParticipants` for a blank or self peer.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn list_by_pair(&self, requester: &str, peer: &str, page: Page) -> Result<Vec<Message>> {
        let pair = ParticipantPair::new(requester, peer)?;
        let conversation = self.conversations.find_by_pair(&pair).await?.ok_or(AppError::NotFound)?;
        self.messages.list(conversation.id, page).await
    }

    /// Messages in the conversation addressed to `user_id`. There is no read
    /// marker, so this counts everything the user ever received there.
    ///
    /// # Errors
    /// Returns `AppError::ConversationNotFound` or `AppError::Unauthorized`.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn unread_count(&self, conversation_id: Uuid, user_id: &str) -> Result<i64> {
        self.conversation_for(conversation_id, user_id).await?;
        self.messages.count_addressed_to(conversation_id, user_id).await
    }

    /// Deletes a message on behalf of its sender. The conversation summary is
    /// left as is; see [`Self::rebuild_summary`].
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if absent and `AppError::Forbidden` if the
    /// requester did not send it.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn delete(&self, message_id: Uuid, requester: &str) -> Result<()> {
        let message = self.messages.get(message_id).await?.ok_or(AppError::NotFound)?;
        if message.sender_id != requester {
            return Err(AppError::Forbidden);
        }

        if !self.messages.delete(message_id).await? {
            return Err(AppError::NotFound);
        }

        tracing::debug!("Message deleted");
        self.notifier.publish(message.conversation_id, ConversationEvent::MessageDeleted { message_id }).await;
        Ok(())
    }

    /// Messages strictly newer than `after`, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn list_after(
        &self,
        conversation_id: Uuid,
        after: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        self.messages.list_after(conversation_id, after, limit).await
    }

    /// Recomputes the summary from the latest surviving message.
    ///
    /// # Errors
    /// Returns `AppError::ConversationNotFound` if the conversation does not exist.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn rebuild_summary(&self, conversation_id: Uuid) -> Result<Conversation> {
        let mut conversation = self.conversation(conversation_id).await?;
        let latest = self.messages.latest(conversation_id).await?;

        let (last_message_at, preview) = match latest {
            Some(m) => (
                Some(m.created_at),
                Some(message::preview(&m.content, m.offer.as_ref(), self.config.preview_max_chars)),
            ),
            None => (None, None),
        };

        self.conversations.set_summary(conversation_id, last_message_at, preview.clone()).await?;
        conversation.last_message_at = last_message_at;
        conversation.last_message_preview = preview;
        Ok(conversation)
    }

    /// Opens an ordered live feed of `conversation` for one of its participants.
    ///
    /// Only changes made after this call are delivered.
    pub async fn subscribe(&self, conversation: &Conversation) -> ConversationFeed {
        let receiver = self.notifier.subscribe(conversation.id).await;
        let cursor = match self.messages.latest(conversation.id).await {
            Ok(latest) => latest.map(|m| m.created_at),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read feed cursor, falling back to summary");
                conversation.last_message_at
            }
        };
        ConversationFeed::new(conversation.id, self.clone(), receiver, cursor, self.config.feed_batch_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::NotificationConfig;
    use crate::domain::message::OfferDetails;
    use crate::services::notification::LocalChangeNotifier;
    use rust_decimal::Decimal;

    struct Fixture {
        service: MessageService,
        store: Arc<MemoryStore>,
        conversation: Conversation,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(LocalChangeNotifier::new(&NotificationConfig::default()));
        let service = MessageService::new(
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            Arc::clone(&store) as Arc<dyn MessageStore>,
            notifier,
            MessagingConfig::default(),
        );
        let pair = ParticipantPair::new("u1", "u2").expect("pair");
        let conversation = ConversationStore::insert(store.as_ref(), &pair).await.expect("conversation");
        Fixture { service, store, conversation }
    }

    fn request(conversation: &Conversation, from: &str, to: &str, content: &str) -> AppendRequest {
        AppendRequest {
            conversation_id: conversation.id,
            sender_id: from.into(),
            receiver_id: to.into(),
            content: content.into(),
            offer: None,
        }
    }

    async fn fetch_summary(store: &MemoryStore, id: Uuid) -> Conversation {
        ConversationStore::get(store, id).await.expect("get").expect("conversation exists")
    }

    fn bike_offer() -> OfferPayload {
        OfferPayload::new(OfferDetails::Buy { amount: Decimal::new(120, 0) }, "Bike".into(), None).expect("offer")
    }

    #[tokio::test]
    async fn test_scenario_preview_and_unread() {
        let f = fixture().await;

        f.service.append(request(&f.conversation, "u1", "u2", "hi")).await.expect("hi");
        let summary = fetch_summary(&f.store, f.conversation.id).await;
        assert_eq!(summary.last_message_preview.as_deref(), Some("hi"));

        let mut offer = request(&f.conversation, "u2", "u1", "");
        offer.offer = Some(bike_offer());
        let with_offer = f.service.append(offer).await.expect("offer");
        assert_eq!(with_offer.offer, Some(bike_offer()));

        let summary = fetch_summary(&f.store, f.conversation.id).await;
        assert_eq!(summary.last_message_preview.as_deref(), Some("Bike"));
        assert_eq!(summary.last_message_at, Some(with_offer.created_at));

        assert_eq!(f.service.unread_count(f.conversation.id, "u1").await.expect("unread"), 1);
        assert_eq!(f.service.unread_count(f.conversation.id, "u2").await.expect("unread"), 1);
    }

    #[tokio::test]
    async fn test_created_at_strictly_increases() {
        let f = fixture().await;
        for i in 0..20 {
            f.service.append(request(&f.conversation, "u1", "u2", &format!("m{i}"))).await.expect("append");
        }

        let messages = f.service.list(f.conversation.id, "u2", Page::new(0, 100)).await.expect("list");
        assert_eq!(messages.len(), 20);
        assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(messages[0].content, "m0");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_ordered() {
        let f = fixture().await;

        let appends = (0..40).map(|i| {
            let service = f.service.clone();
            let (from, to) = if i % 2 == 0 { ("u1", "u2") } else { ("u2", "u1") };
            let append = request(&f.conversation, from, to, &format!("m{i}"));
            tokio::spawn(async move { service.append(append).await })
        });
        for result in futures::future::join_all(appends).await {
            result.expect("join").expect("append");
        }

        let messages = f.service.list(f.conversation.id, "u1", Page::new(0, 100)).await.expect("list");
        assert_eq!(messages.len(), 40);
        assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));

        assert_eq!(f.service.unread_count(f.conversation.id, "u1").await.expect("unread"), 20);
        assert_eq!(f.service.unread_count(f.conversation.id, "u2").await.expect("unread"), 20);

        let summary = fetch_summary(&f.store, f.conversation.id).await;
        assert_eq!(summary.last_message_at, messages.last().map(|m| m.created_at));
    }

    #[tokio::test]
    async fn test_append_validation() {
        let f = fixture().await;

        let outsider = request(&f.conversation, "u3", "u1", "hi");
        assert!(matches!(f.service.append(outsider).await, Err(AppError::Unauthorized)));

        let wrong_receiver = request(&f.conversation, "u1", "u3", "hi");
        assert!(matches!(f.service.append(wrong_receiver).await, Err(AppError::InvalidArgument(_))));

        let empty = request(&f.conversation, "u1", "u2", "   ");
        assert!(matches!(f.service.append(empty).await, Err(AppError::InvalidArgument(_))));

        let mut half_formed = request(&f.conversation, "u1", "u2", "");
        half_formed.offer = Some(OfferPayload {
            details: OfferDetails::Trade { item_name: String::new(), item_description: None, item_images: vec![] },
            listing_title: "Bike".into(),
            listing_image: None,
        });
        assert!(matches!(f.service.append(half_formed).await, Err(AppError::InvalidOffer(_))));

        let mut missing = request(&f.conversation, "u1", "u2", "hi");
        missing.conversation_id = Uuid::new_v4();
        assert!(matches!(f.service.append(missing).await, Err(AppError::ConversationNotFound)));

        assert!(f.service.list(f.conversation.id, "u1", Page::default()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_delete_authorization() {
        let f = fixture().await;
        let m1 = f.service.append(request(&f.conversation, "u1", "u2", "hi")).await.expect("append");

        assert!(matches!(f.service.delete(m1.id, "u2").await, Err(AppError::Forbidden)));
        f.service.delete(m1.id, "u1").await.expect("sender may delete");
        assert!(matches!(f.service.delete(m1.id, "u1").await, Err(AppError::NotFound)));

        // Summary is stale until rebuilt.
        let stale = fetch_summary(&f.store, f.conversation.id).await;
        assert_eq!(stale.last_message_preview.as_deref(), Some("hi"));

        let rebuilt = f.service.rebuild_summary(f.conversation.id).await.expect("rebuild");
        assert_eq!(rebuilt.last_message_preview, None);
        assert_eq!(rebuilt.last_message_at, None);
    }

    #[tokio::test]
    async fn test_list_by_pair_never_creates() {
        let f = fixture().await;
        f.service.append(request(&f.conversation, "u1", "u2", "hi")).await.expect("append");

        let messages = f.service.list_by_pair("u2", "u1", Page::default()).await.expect("pair listing");
        assert_eq!(messages.len(), 1);

        assert!(matches!(f.service.list_by_pair("u1", "u9", Page::default()).await, Err(AppError::NotFound)));
    }
}
