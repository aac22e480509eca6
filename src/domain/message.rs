use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub const MAX_OFFER_IMAGES: usize = 4;
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub offer: Option<OfferPayload>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A message that passed validation and is ready to be written.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub offer: Option<OfferPayload>,
}

/// What the offer proposes: money or an item swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OfferDetails {
    Buy {
        amount: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Trade {
        item_name: String,
        item_description: Option<String>,
        #[serde(default)]
        item_images: Vec<String>,
    },
}

/// Structured offer carried inside a chat message, with the listing context
/// needed to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    #[serde(flatten)]
    pub details: OfferDetails,
    pub listing_title: String,
    pub listing_image: Option<String>,
}

impl OfferPayload {
    /// Builds a payload, rejecting anything half-formed.
    ///
    /// # Errors
    /// Returns `AppError::InvalidOffer` if the amount is negative, the trade item
    /// is unnamed, more than four images are attached, or the listing title is blank.
    pub fn new(details: OfferDetails, listing_title: String, listing_image: Option<String>) -> Result<Self> {
        let payload = Self { details, listing_title, listing_image };
        payload.validate()?;
        Ok(payload)
    }

    /// # Errors
    /// Returns `AppError::InvalidOffer` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.listing_title.trim().is_empty() {
            return Err(AppError::InvalidOffer("listingTitle is required".into()));
        }
        match &self.details {
            OfferDetails::Buy { amount } => {
                if amount.is_sign_negative() && !amount.is_zero() {
                    return Err(AppError::InvalidOffer("amount must not be negative".into()));
                }
            }
            OfferDetails::Trade { item_name, item_images, .. } => {
                if item_name.trim().is_empty() {
                    return Err(AppError::InvalidOffer("itemName is required for trade offers".into()));
                }
                if item_images.len() > MAX_OFFER_IMAGES {
                    return Err(AppError::InvalidOffer(format!(
                        "at most {MAX_OFFER_IMAGES} item images are allowed"
                    )));
                }
                if item_images.iter().any(|uri| uri.trim().is_empty()) {
                    return Err(AppError::InvalidOffer("item image URIs must not be empty".into()));
                }
            }
        }
        Ok(())
    }
}

/// Checks the prose part of a message.
///
/// # Errors
/// Returns `AppError::InvalidArgument` if the content is blank without an offer
/// or longer than `max_chars`.
pub fn validate_content(content: &str, has_offer: bool, max_chars: usize) -> Result<()> {
    if content.trim().is_empty() && !has_offer {
        return Err(AppError::invalid("message content must not be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(AppError::invalid(format!("message content exceeds {max_chars} characters")));
    }
    Ok(())
}

/// Conversation list preview: the message text, or the offer's listing title
/// for a pure offer, cut to `max_chars` with an ellipsis marker.
#[must_use]
pub fn preview(content: &str, offer: Option<&OfferPayload>, max_chars: usize) -> String {
    let source = if content.trim().is_empty() { offer.map_or("", |o| o.listing_title.as_str()) } else { content };

    if source.chars().count() <= max_chars {
        source.to_string()
    } else {
        let mut truncated: String = source.chars().take(max_chars).collect();
        truncated.push(ELLIPSIS);
        truncated
    }
}

/// Next timestamp for a conversation's log: `now` at microsecond precision,
/// bumped past the previous append so ordering within a conversation is strict.
#[must_use]
pub fn next_timestamp(previous: Option<OffsetDateTime>, now: OffsetDateTime) -> OffsetDateTime {
    let now = now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000).unwrap_or(now);
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(amount: i64) -> OfferDetails {
        OfferDetails::Buy { amount: Decimal::new(amount, 0) }
    }

    #[test]
    fn test_buy_offer_validation() {
        assert!(OfferPayload::new(buy(20), "Bike".into(), None).is_ok());
        assert!(OfferPayload::new(buy(0), "Bike".into(), None).is_ok());
        assert!(matches!(OfferPayload::new(buy(-1), "Bike".into(), None), Err(AppError::InvalidOffer(_))));
        assert!(matches!(OfferPayload::new(buy(5), " ".into(), None), Err(AppError::InvalidOffer(_))));
    }

    #[test]
    fn test_trade_offer_validation() {
        let trade = |name: &str, images: usize| OfferDetails::Trade {
            item_name: name.into(),
            item_description: None,
            item_images: (0..images).map(|i| format!("https://img.example/{i}.jpg")).collect(),
        };
        assert!(OfferPayload::new(trade("Guitar", 4), "Bike".into(), None).is_ok());
        assert!(matches!(OfferPayload::new(trade("", 0), "Bike".into(), None), Err(AppError::InvalidOffer(_))));
        assert!(matches!(OfferPayload::new(trade("Guitar", 5), "Bike".into(), None), Err(AppError::InvalidOffer(_))));
    }

    #[test]
    fn test_payload_json_shape() {
        let payload = OfferPayload::new(buy(20), "Bike".into(), Some("https://img.example/bike.jpg".into()))
            .expect("valid payload");
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["kind"], "buy");
        assert_eq!(value["listingTitle"], "Bike");

        let trade: OfferPayload = serde_json::from_value(serde_json::json!({
            "kind": "trade",
            "itemName": "Guitar",
            "listingTitle": "Bike",
            "listingImage": null
        }))
        .expect("deserialize");
        assert!(matches!(trade.details, OfferDetails::Trade { ref item_images, .. } if item_images.is_empty()));
    }

    #[test]
    fn test_content_rules() {
        assert!(validate_content("hi", false, 10).is_ok());
        assert!(validate_content("", true, 10).is_ok());
        assert!(matches!(validate_content("   ", false, 10), Err(AppError::InvalidArgument(_))));
        assert!(matches!(validate_content("this is too long", false, 10), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn test_preview_rules() {
        let offer = OfferPayload::new(buy(20), "Bike".into(), None).expect("valid payload");
        assert_eq!(preview("hi", None, 120), "hi");
        assert_eq!(preview("", Some(&offer), 120), "Bike");
        assert_eq!(preview("take it", Some(&offer), 120), "take it");

        let long = "x".repeat(130);
        let cut = preview(&long, None, 120);
        assert_eq!(cut.chars().count(), 121);
        assert!(cut.ends_with('…'));

        let exact = "y".repeat(120);
        assert_eq!(preview(&exact, None, 120), exact);
    }

    #[test]
    fn test_next_timestamp_is_strictly_increasing() {
        let now = OffsetDateTime::now_utc();
        let first = next_timestamp(None, now);
        let second = next_timestamp(Some(first), now);
        let third = next_timestamp(Some(second), now - Duration::seconds(5));
        assert!(first < second);
        assert!(second < third);
        assert_eq!(first.nanosecond() % 1_000, 0);
    }
}
