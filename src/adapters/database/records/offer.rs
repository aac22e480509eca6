use crate::domain::offer::Offer;
use crate::error::AppError;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct OfferRecord {
    pub(crate) id: Uuid,
    pub(crate) listing_id: String,
    pub(crate) offerer_id: String,
    pub(crate) message: Option<String>,
    pub(crate) price: Option<Decimal>,
    pub(crate) status: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<OfferRecord> for Offer {
    type Error = AppError;

    fn try_from(record: OfferRecord) -> Result<Self, Self::Error> {
        let status = record.status.parse().map_err(|_| {
            tracing::error!(offer_id = %record.id, status = %record.status, "Stored offer has unknown status");
            AppError::Internal
        })?;

        Ok(Self {
            id: record.id,
            listing_id: record.listing_id,
            offerer_id: record.offerer_id,
            message: record.message,
            price: record.price,
            status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
