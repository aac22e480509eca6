use crate::adapters::database::records::ConversationRecord;
use crate::adapters::database::{DbPool, UNIQUE_VIOLATION};
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::page::Page;
use crate::error::{AppError, Result};
use crate::services::ports::ConversationStore;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ConversationRepository {
    pool: DbPool,
}

impl ConversationRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn find_by_pair(&self, pair: &ParticipantPair) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_message_at, last_message_preview
            FROM conversations
            WHERE participant_low = $1 AND participant_high = $2
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn insert(&self, pair: &ParticipantPair) -> Result<Conversation> {
        let result = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high)
            VALUES ($1, $2, $3)
            RETURNING id, participant_low, participant_high, created_at, last_message_at, last_message_preview
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(pair.low())
        .bind(pair.high())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::Conflict("conversation already exists for this pair".into()))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_message_at, last_message_preview
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_for_user(&self, user_id: &str, page: Page) -> Result<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, created_at, last_message_at, last_message_preview
            FROM conversations
            WHERE participant_low = $1 OR participant_high = $1
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self, preview))]
    async fn set_summary(
        &self,
        id: Uuid,
        last_message_at: Option<OffsetDateTime>,
        preview: Option<String>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE conversations SET last_message_at = $2, last_message_preview = $3 WHERE id = $1")
                .bind(id)
                .bind(last_message_at)
                .bind(preview)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ConversationNotFound);
        }
        Ok(())
    }
}
