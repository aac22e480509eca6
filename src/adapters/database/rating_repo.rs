use crate::adapters::database::DbPool;
use crate::adapters::database::records::RatingRecord;
use crate::domain::rating::{Rating, RatingStats};
use crate::error::Result;
use crate::services::ports::RatingStore;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RatingRepository {
    pool: DbPool,
}

impl RatingRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RatingStore for RatingRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn upsert(&self, rater_id: &str, rated_user_id: &str, value: i32) -> Result<Rating> {
        let record = sqlx::query_as::<_, RatingRecord>(
            r#"
            INSERT INTO ratings (id, rater_id, rated_user_id, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (rater_id, rated_user_id)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING id, rater_id, rated_user_id, value, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(rater_id)
        .bind(rated_user_id)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, rater_id: &str, rated_user_id: &str) -> Result<Option<Rating>> {
        let record = sqlx::query_as::<_, RatingRecord>(
            r#"
            SELECT id, rater_id, rated_user_id, value, created_at, updated_at
            FROM ratings
            WHERE rater_id = $1 AND rated_user_id = $2
            "#,
        )
        .bind(rater_id)
        .bind(rated_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn stats_for(&self, rated_user_id: &str) -> Result<RatingStats> {
        let (count, sum) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(value), 0)::BIGINT FROM ratings WHERE rated_user_id = $1",
        )
        .bind(rated_user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RatingStats { count, sum })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn rated_users(&self) -> Result<Vec<String>> {
        let users = sqlx::query_scalar::<_, String>("SELECT DISTINCT rated_user_id FROM ratings ORDER BY rated_user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}
