use crate::adapters::database::DbPool;
use crate::adapters::database::records::UserRecord;
use crate::domain::user::UserProfile;
use crate::error::{AppError, Result};
use crate::services::ports::UserDirectory;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Reads the profile table owned by the user service; only `rating` is written.
#[derive(Clone, Debug)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, display_name, avatar_url, rating FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_rating(&self, id: &str, rating: Option<Decimal>) -> Result<()> {
        let result = sqlx::query("UPDATE users SET rating = $2 WHERE id = $1")
            .bind(id)
            .bind(rating)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
