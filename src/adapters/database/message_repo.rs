use crate::adapters::database::DbPool;
use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{Message, NewMessage, next_timestamp};
use crate::domain::page::Page;
use crate::error::{AppError, Result};
use crate::services::ports::MessageStore;
use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    /// Locks the conversation row so concurrent appends serialize on it; the
    /// timestamp, the insert and the summary update commit together.
    #[tracing::instrument(
        level = "debug",
        skip(self, message, preview),
        fields(conversation_id = %message.conversation_id)
    )]
    async fn append(&self, message: NewMessage, preview: String) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        let last_message_at = sqlx::query_scalar::<_, Option<OffsetDateTime>>(
            "SELECT last_message_at FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(message.conversation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::ConversationNotFound)?;

        let created_at = next_timestamp(last_message_at, OffsetDateTime::now_utc());

        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, offer, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, conversation_id, sender_id, receiver_id, content, offer, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.content)
        .bind(message.offer.map(Json))
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2, last_message_preview = $3 WHERE id = $1")
            .bind(record.conversation_id)
            .bind(record.created_at)
            .bind(preview)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record.into())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, offer, created_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self, conversation_id: Uuid, page: Page) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, offer, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, seq ASC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(conversation_id)
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_after(
        &self,
        conversation_id: Uuid,
        after: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let records = match after {
            Some(cursor) => {
                sqlx::query_as::<_, MessageRecord>(
                    r#"
                    SELECT id, conversation_id, sender_id, receiver_id, content, offer, created_at
                    FROM messages
                    WHERE conversation_id = $1
                      AND created_at > $2
                    ORDER BY created_at ASC, seq ASC
                    LIMIT $3
                    "#,
                )
                .bind(conversation_id)
                .bind(cursor)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MessageRecord>(
                    r#"
                    SELECT id, conversation_id, sender_id, receiver_id, content, offer, created_at
                    FROM messages
                    WHERE conversation_id = $1
                    ORDER BY created_at ASC, seq ASC
                    LIMIT $2
                    "#,
                )
                .bind(conversation_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn latest(&self, conversation_id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, offer, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn count_addressed_to(&self, conversation_id: Uuid, user_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND receiver_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
