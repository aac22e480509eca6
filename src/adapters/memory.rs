//! Process-local implementation of every store port, used when no database is
//! configured and by the test suite. All state sits behind a single mutex so
//! each operation is atomic, mirroring the row locks the Postgres adapter takes.

use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::listing::Listing;
use crate::domain::message::{Message, NewMessage, next_timestamp};
use crate::domain::offer::{NewOffer, Offer, OfferFilter, OfferStatus};
use crate::domain::page::Page;
use crate::domain::rating::{Rating, RatingStats};
use crate::domain::user::UserProfile;
use crate::error::{AppError, Result};
use crate::services::ports::{
    ConversationStore, ListingCatalog, MessageStore, OfferStore, RatingStore, Stores, UserDirectory,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    pairs: HashMap<ParticipantPair, Uuid>,
    // Insertion order; appends to one conversation are serialized by the lock,
    // so this is also `created_at` order within each conversation.
    messages: Vec<Message>,
    offers: HashMap<Uuid, Offer>,
    ratings: HashMap<(String, String), Rating>,
    users: HashMap<String, UserProfile>,
    listings: HashMap<String, Listing>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|e| {
            tracing::error!(error = %e, "In-memory store lock poisoned");
            AppError::Internal
        })
    }

    /// Registers a profile, standing in for the user service.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the store lock is poisoned.
    pub fn put_user(&self, profile: UserProfile) -> Result<()> {
        self.state()?.users.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Registers a listing, standing in for the listing catalog.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if the store lock is poisoned.
    pub fn put_listing(&self, listing: Listing) -> Result<()> {
        self.state()?.listings.insert(listing.id.clone(), listing);
        Ok(())
    }
}

/// Every port backed by the same in-memory state.
#[must_use]
pub fn stores(store: &Arc<MemoryStore>) -> Stores {
    Stores {
        conversations: Arc::clone(store) as Arc<dyn ConversationStore>,
        messages: Arc::clone(store) as Arc<dyn MessageStore>,
        offers: Arc::clone(store) as Arc<dyn OfferStore>,
        ratings: Arc::clone(store) as Arc<dyn RatingStore>,
        users: Arc::clone(store) as Arc<dyn UserDirectory>,
        listings: Arc::clone(store) as Arc<dyn ListingCatalog>,
    }
}

fn activity_key(conversation: &Conversation) -> (bool, Option<OffsetDateTime>, OffsetDateTime, Uuid) {
    (conversation.last_message_at.is_some(), conversation.last_message_at, conversation.created_at, conversation.id)
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_by_pair(&self, pair: &ParticipantPair) -> Result<Option<Conversation>> {
        let state = self.state()?;
        Ok(state.pairs.get(pair).and_then(|id| state.conversations.get(id)).cloned())
    }

    async fn insert(&self, pair: &ParticipantPair) -> Result<Conversation> {
        let mut state = self.state()?;
        if state.pairs.contains_key(pair) {
            return Err(AppError::Conflict("conversation already exists for this pair".into()));
        }

        let conversation = Conversation {
            id: Uuid::now_v7(),
            participant_low: pair.low().to_string(),
            participant_high: pair.high().to_string(),
            created_at: next_timestamp(None, OffsetDateTime::now_utc()),
            last_message_at: None,
            last_message_preview: None,
        };
        state.pairs.insert(pair.clone(), conversation.id);
        state.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state()?.conversations.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: &str, page: Page) -> Result<Vec<Conversation>> {
        let state = self.state()?;
        let mut conversations: Vec<Conversation> =
            state.conversations.values().filter(|c| c.has_participant(user_id)).cloned().collect();
        conversations.sort_by(|a, b| activity_key(b).cmp(&activity_key(a)));
        Ok(page.slice(&conversations))
    }

    async fn set_summary(
        &self,
        id: Uuid,
        last_message_at: Option<OffsetDateTime>,
        preview: Option<String>,
    ) -> Result<()> {
        let mut state = self.state()?;
        let conversation = state.conversations.get_mut(&id).ok_or(AppError::ConversationNotFound)?;
        conversation.last_message_at = last_message_at;
        conversation.last_message_preview = preview;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: NewMessage, preview: String) -> Result<Message> {
        let mut state = self.state()?;
        let conversation =
            state.conversations.get_mut(&message.conversation_id).ok_or(AppError::ConversationNotFound)?;

        let created_at = next_timestamp(conversation.last_message_at, OffsetDateTime::now_utc());
        conversation.last_message_at = Some(created_at);
        conversation.last_message_preview = Some(preview);

        let stored = Message {
            id: Uuid::now_v7(),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            offer: message.offer,
            created_at,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.state()?.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list(&self, conversation_id: Uuid, page: Page) -> Result<Vec<Message>> {
        let state = self.state()?;
        let messages: Vec<Message> =
            state.messages.iter().filter(|m| m.conversation_id == conversation_id).cloned().collect();
        Ok(page.slice(&messages))
    }

    async fn list_after(
        &self,
        conversation_id: Uuid,
        after: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let state = self.state()?;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && after.is_none_or(|cursor| m.created_at > cursor))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn latest(&self, conversation_id: Uuid) -> Result<Option<Message>> {
        Ok(self.state()?.messages.iter().rev().find(|m| m.conversation_id == conversation_id).cloned())
    }

    async fn count_addressed_to(&self, conversation_id: Uuid, user_id: &str) -> Result<i64> {
        let state = self.state()?;
        let count =
            state.messages.iter().filter(|m| m.conversation_id == conversation_id && m.receiver_id == user_id).count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state()?;
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        Ok(state.messages.len() < before)
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn insert(&self, offer: NewOffer) -> Result<Offer> {
        let now = next_timestamp(None, OffsetDateTime::now_utc());
        let stored = Offer {
            id: Uuid::now_v7(),
            listing_id: offer.listing_id,
            offerer_id: offer.offerer_id,
            message: offer.message,
            price: offer.price,
            status: OfferStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.state()?.offers.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Offer>> {
        Ok(self.state()?.offers.get(&id).cloned())
    }

    async fn list(&self, filter: &OfferFilter, page: Page) -> Result<Vec<Offer>> {
        let state = self.state()?;
        let mut offers: Vec<Offer> = state.offers.values().filter(|o| filter.matches(o)).cloned().collect();
        offers.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(page.slice(&offers))
    }

    async fn update_status(&self, id: Uuid, expected: OfferStatus, next: OfferStatus) -> Result<Option<Offer>> {
        let mut state = self.state()?;
        match state.offers.get_mut(&id) {
            Some(offer) if offer.status == expected => {
                offer.status = next;
                offer.updated_at = OffsetDateTime::now_utc();
                Ok(Some(offer.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl RatingStore for MemoryStore {
    async fn upsert(&self, rater_id: &str, rated_user_id: &str, value: i32) -> Result<Rating> {
        let mut state = self.state()?;
        let now = OffsetDateTime::now_utc();
        let rating = state
            .ratings
            .entry((rater_id.to_string(), rated_user_id.to_string()))
            .and_modify(|r| {
                r.value = value;
                r.updated_at = now;
            })
            .or_insert_with(|| Rating {
                id: Uuid::now_v7(),
                rater_id: rater_id.to_string(),
                rated_user_id: rated_user_id.to_string(),
                value,
                created_at: now,
                updated_at: now,
            });
        Ok(rating.clone())
    }

    async fn get(&self, rater_id: &str, rated_user_id: &str) -> Result<Option<Rating>> {
        Ok(self.state()?.ratings.get(&(rater_id.to_string(), rated_user_id.to_string())).cloned())
    }

    async fn stats_for(&self, rated_user_id: &str) -> Result<RatingStats> {
        let state = self.state()?;
        Ok(state.ratings.values().filter(|r| r.rated_user_id == rated_user_id).fold(
            RatingStats::default(),
            |acc, r| RatingStats { count: acc.count + 1, sum: acc.sum + i64::from(r.value) },
        ))
    }

    async fn rated_users(&self) -> Result<Vec<String>> {
        let state = self.state()?;
        let mut users: Vec<String> = state.ratings.values().map(|r| r.rated_user_id.clone()).collect();
        users.sort();
        users.dedup();
        Ok(users)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        Ok(self.state()?.users.get(id).cloned())
    }

    async fn set_rating(&self, id: &str, rating: Option<Decimal>) -> Result<()> {
        let mut state = self.state()?;
        let user = state.users.get_mut(id).ok_or(AppError::NotFound)?;
        user.rating = rating;
        Ok(())
    }
}

#[async_trait]
impl ListingCatalog for MemoryStore {
    async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        Ok(self.state()?.listings.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_pair_insert_conflicts() {
        let store = MemoryStore::new();
        let pair = ParticipantPair::new("u1", "u2").expect("pair");

        ConversationStore::insert(&store, &pair).await.expect("first insert");
        let second = ConversationStore::insert(&store, &pair).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_append_to_missing_conversation() {
        let store = MemoryStore::new();
        let message = NewMessage {
            conversation_id: Uuid::new_v4(),
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            content: "hi".into(),
            offer: None,
        };
        let result = store.append(message, "hi".into()).await;
        assert!(matches!(result, Err(AppError::ConversationNotFound)));
    }

    #[tokio::test]
    async fn test_offer_compare_and_set() {
        let store = MemoryStore::new();
        let offer = OfferStore::insert(
            &store,
            NewOffer { listing_id: "l1".into(), offerer_id: "u1".into(), message: None, price: None },
        )
        .await
        .expect("insert");

        let accepted = store.update_status(offer.id, OfferStatus::Pending, OfferStatus::Accepted).await.expect("cas");
        assert_eq!(accepted.map(|o| o.status), Some(OfferStatus::Accepted));

        let stale = store.update_status(offer.id, OfferStatus::Pending, OfferStatus::Rejected).await.expect("cas");
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_rating_upsert_keeps_one_row() {
        let store = MemoryStore::new();
        let first = store.upsert("u1", "u2", 3).await.expect("upsert");
        let second = store.upsert("u1", "u2", 4).await.expect("upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(store.stats_for("u2").await.expect("stats"), RatingStats { count: 1, sum: 4 });
    }
}
