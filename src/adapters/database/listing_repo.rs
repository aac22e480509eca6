use crate::adapters::database::DbPool;
use crate::adapters::database::records::ListingRecord;
use crate::domain::listing::Listing;
use crate::error::Result;
use crate::services::ports::ListingCatalog;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct ListingRepository {
    pool: DbPool,
}

impl ListingRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingCatalog for ListingRepository {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        let record =
            sqlx::query_as::<_, ListingRecord>("SELECT id, title, image, owner_id FROM listings WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(Into::into))
    }
}
