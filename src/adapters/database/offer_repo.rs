use crate::adapters::database::DbPool;
use crate::adapters::database::records::OfferRecord;
use crate::domain::offer::{NewOffer, Offer, OfferFilter, OfferStatus};
use crate::domain::page::Page;
use crate::error::Result;
use crate::services::ports::OfferStore;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct OfferRepository {
    pool: DbPool,
}

impl OfferRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferStore for OfferRepository {
    #[tracing::instrument(level = "debug", skip(self, offer), fields(listing_id = %offer.listing_id))]
    async fn insert(&self, offer: NewOffer) -> Result<Offer> {
        let record = sqlx::query_as::<_, OfferRecord>(
            r#"
            INSERT INTO offers (id, listing_id, offerer_id, message, price, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, listing_id, offerer_id, message, price, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&offer.listing_id)
        .bind(&offer.offerer_id)
        .bind(&offer.message)
        .bind(offer.price)
        .bind(OfferStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        record.try_into()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Offer>> {
        let record = sqlx::query_as::<_, OfferRecord>(
            r#"
            SELECT id, listing_id, offerer_id, message, price, status, created_at, updated_at
            FROM offers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self, filter: &OfferFilter, page: Page) -> Result<Vec<Offer>> {
        let records = sqlx::query_as::<_, OfferRecord>(
            r#"
            SELECT id, listing_id, offerer_id, message, price, status, created_at, updated_at
            FROM offers
            WHERE ($1::TEXT IS NULL OR listing_id = $1)
              AND ($2::TEXT IS NULL OR offerer_id = $2)
            ORDER BY created_at DESC, id DESC
            OFFSET $3
            LIMIT $4
            "#,
        )
        .bind(&filter.listing_id)
        .bind(&filter.offerer_id)
        .bind(page.offset)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn update_status(&self, id: Uuid, expected: OfferStatus, next: OfferStatus) -> Result<Option<Offer>> {
        let record = sqlx::query_as::<_, OfferRecord>(
            r#"
            UPDATE offers
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING id, listing_id, offerer_id, message, price, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(TryInto::try_into).transpose()
    }
}
