use crate::domain::offer::{OfferFilter, OfferStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOfferRequest {
    pub listing_id: String,
    pub message: Option<String>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

impl SetStatusRequest {
    /// # Errors
    /// Returns `AppError::InvalidArgument` for an unknown status name.
    pub fn status(&self) -> Result<OfferStatus> {
        self.status.trim().to_ascii_lowercase().parse()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferListQuery {
    pub listing_id: Option<String>,
    pub offerer_id: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl OfferListQuery {
    #[must_use]
    pub fn filter(&self) -> OfferFilter {
        OfferFilter { listing_id: self.listing_id.clone(), offerer_id: self.offerer_id.clone() }
    }
}
