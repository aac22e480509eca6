use crate::domain::message::{OfferDetails, OfferPayload};
use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    pub receiver_id: String,
    #[serde(default)]
    pub content: String,
    pub offer: Option<OfferPayloadRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessagesQuery {
    pub peer_id: String,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Offer as clients send it. Every field is optional on the wire so that a
/// half-formed payload is reported as `InvalidOffer` rather than a decode error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayloadRequest {
    pub kind: Option<String>,
    pub amount: Option<Decimal>,
    pub item_name: Option<String>,
    pub item_description: Option<String>,
    #[serde(default)]
    pub item_images: Vec<String>,
    pub listing_title: Option<String>,
    pub listing_image: Option<String>,
}

impl TryFrom<OfferPayloadRequest> for OfferPayload {
    type Error = AppError;

    fn try_from(request: OfferPayloadRequest) -> Result<Self> {
        let kind = request.kind.as_deref().map(str::trim).map(str::to_ascii_lowercase);
        let details = match kind.as_deref() {
            Some("buy") => OfferDetails::Buy {
                amount: request.amount.ok_or_else(|| AppError::InvalidOffer("amount is required for buy offers".into()))?,
            },
            Some("trade") => OfferDetails::Trade {
                item_name: request.item_name.unwrap_or_default(),
                item_description: request.item_description.filter(|d| !d.trim().is_empty()),
                item_images: request.item_images,
            },
            Some(other) => return Err(AppError::InvalidOffer(format!("unknown offer kind '{other}'"))),
            None => return Err(AppError::InvalidOffer("kind is required".into())),
        };

        Self::new(details, request.listing_title.unwrap_or_default(), request.listing_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_offer_requires_amount() {
        let request = OfferPayloadRequest {
            kind: Some("buy".into()),
            listing_title: Some("Bike".into()),
            ..OfferPayloadRequest::default()
        };
        assert!(matches!(OfferPayload::try_from(request), Err(AppError::InvalidOffer(_))));
    }

    #[test]
    fn test_trade_offer_converts() {
        let request = OfferPayloadRequest {
            kind: Some("Trade".into()),
            item_name: Some("Guitar".into()),
            item_images: vec!["https://img.example/g.jpg".into()],
            listing_title: Some("Bike".into()),
            ..OfferPayloadRequest::default()
        };
        let payload = OfferPayload::try_from(request).expect("valid trade");
        assert_eq!(payload.listing_title, "Bike");
        assert!(matches!(payload.details, OfferDetails::Trade { ref item_name, .. } if item_name == "Guitar"));
    }

    #[test]
    fn test_missing_kind_and_title() {
        assert!(matches!(OfferPayload::try_from(OfferPayloadRequest::default()), Err(AppError::InvalidOffer(_))));

        let untitled = OfferPayloadRequest {
            kind: Some("buy".into()),
            amount: Some(Decimal::new(10, 0)),
            ..OfferPayloadRequest::default()
        };
        assert!(matches!(OfferPayload::try_from(untitled), Err(AppError::InvalidOffer(_))));
    }
}
