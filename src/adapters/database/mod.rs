pub mod conversation_repo;
pub mod listing_repo;
pub mod message_repo;
pub mod offer_repo;
pub mod rating_repo;
pub mod records;
pub mod user_repo;

use crate::config::DatabaseConfig;
use crate::services::ports::Stores;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use std::time::Duration;

pub use conversation_repo::ConversationRepository;
pub use listing_repo::ListingRepository;
pub use message_repo::MessageRepository;
pub use offer_repo::OfferRepository;
pub use rating_repo::RatingRepository;
pub use user_repo::UserRepository;

pub type DbPool = Pool<Postgres>;

pub(crate) const UNIQUE_VIOLATION: &str = "23505";

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(url: &str, config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(url)
        .await
}

/// Postgres-backed stores sharing one pool.
#[must_use]
pub fn stores(pool: &DbPool) -> Stores {
    Stores {
        conversations: Arc::new(ConversationRepository::new(pool.clone())),
        messages: Arc::new(MessageRepository::new(pool.clone())),
        offers: Arc::new(OfferRepository::new(pool.clone())),
        ratings: Arc::new(RatingRepository::new(pool.clone())),
        users: Arc::new(UserRepository::new(pool.clone())),
        listings: Arc::new(ListingRepository::new(pool.clone())),
    }
}
