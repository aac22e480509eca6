//! Storage and collaborator seams the services are written against.
//!
//! Each trait has a Postgres adapter (`adapters::database`) and an in-process
//! adapter (`adapters::memory`). Implementations report a uniqueness race as
//! `AppError::Conflict` and an unreachable backend as `AppError::Unavailable` or
//! `AppError::Database`.

use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::listing::Listing;
use crate::domain::message::{Message, NewMessage};
use crate::domain::offer::{NewOffer, Offer, OfferFilter, OfferStatus};
use crate::domain::page::Page;
use crate::domain::rating::{Rating, RatingStats};
use crate::domain::user::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait ConversationStore: Send + Sync + std::fmt::Debug {
    async fn find_by_pair(&self, pair: &ParticipantPair) -> Result<Option<Conversation>>;

    /// Inserts a conversation for `pair`. Fails with `AppError::Conflict` when one already exists.
    async fn insert(&self, pair: &ParticipantPair) -> Result<Conversation>;

    async fn get(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Conversations of `user_id`, most recent activity first.
    async fn list_for_user(&self, user_id: &str, page: Page) -> Result<Vec<Conversation>>;

    async fn set_summary(&self, id: Uuid, last_message_at: Option<OffsetDateTime>, preview: Option<String>)
    -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Appends under the conversation's write lock: assigns the next timestamp,
    /// stores the message and writes the summary (`preview`) in one step.
    /// Fails with `AppError::ConversationNotFound` if the conversation is gone.
    async fn append(&self, message: NewMessage, preview: String) -> Result<Message>;

    async fn get(&self, id: Uuid) -> Result<Option<Message>>;

    /// Oldest first.
    async fn list(&self, conversation_id: Uuid, page: Page) -> Result<Vec<Message>>;

    /// Oldest first, strictly after `after` when given.
    async fn list_after(&self, conversation_id: Uuid, after: Option<OffsetDateTime>, limit: i64)
    -> Result<Vec<Message>>;

    async fn latest(&self, conversation_id: Uuid) -> Result<Option<Message>>;

    async fn count_addressed_to(&self, conversation_id: Uuid, user_id: &str) -> Result<i64>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait OfferStore: Send + Sync + std::fmt::Debug {
    async fn insert(&self, offer: NewOffer) -> Result<Offer>;

    async fn get(&self, id: Uuid) -> Result<Option<Offer>>;

    /// Newest first.
    async fn list(&self, filter: &OfferFilter, page: Page) -> Result<Vec<Offer>>;

    /// Compare-and-set: writes `next` only while the stored status is still `expected`.
    /// Returns `None` if the offer is missing or its status moved on.
    async fn update_status(&self, id: Uuid, expected: OfferStatus, next: OfferStatus) -> Result<Option<Offer>>;
}

#[async_trait]
pub trait RatingStore: Send + Sync + std::fmt::Debug {
    /// Inserts or overwrites the rating for `(rater_id, rated_user_id)`.
    async fn upsert(&self, rater_id: &str, rated_user_id: &str, value: i32) -> Result<Rating>;

    async fn get(&self, rater_id: &str, rated_user_id: &str) -> Result<Option<Rating>>;

    /// Full scan of the ratings received by `rated_user_id`.
    async fn stats_for(&self, rated_user_id: &str) -> Result<RatingStats>;

    async fn rated_users(&self) -> Result<Vec<String>>;
}

/// User-profile collaborator.
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug {
    async fn get_user(&self, id: &str) -> Result<Option<UserProfile>>;

    /// Writes the materialized trust score. Fails with `AppError::NotFound` for unknown users.
    async fn set_rating(&self, id: &str, rating: Option<Decimal>) -> Result<()>;
}

/// Listing-catalog collaborator.
#[async_trait]
pub trait ListingCatalog: Send + Sync + std::fmt::Debug {
    async fn get_listing(&self, id: &str) -> Result<Option<Listing>>;
}

/// Every store the services need, behind one handle.
#[derive(Clone, Debug)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub offers: Arc<dyn OfferStore>,
    pub ratings: Arc<dyn RatingStore>,
    pub users: Arc<dyn UserDirectory>,
    pub listings: Arc<dyn ListingCatalog>,
}
