use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }

    /// Transition table. Re-applying the current status is allowed so retried
    /// requests stay idempotent; nothing leaves a terminal state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Pending | Self::Accepted | Self::Rejected)
                | (Self::Accepted, Self::Accepted)
                | (Self::Rejected, Self::Rejected)
        )
    }

    /// # Errors
    /// Returns `AppError::InvalidTransition` if `next` is not reachable from `self`.
    pub fn transition_to(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition { from: self.to_string(), to: next.to_string() })
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(AppError::invalid(format!("unknown offer status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub listing_id: String,
    pub offerer_id: String,
    pub message: Option<String>,
    pub price: Option<Decimal>,
    pub status: OfferStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub listing_id: String,
    pub offerer_id: String,
    pub message: Option<String>,
    pub price: Option<Decimal>,
}

/// Optional filters for listing offers; `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    pub listing_id: Option<String>,
    pub offerer_id: Option<String>,
}

impl OfferFilter {
    #[must_use]
    pub fn matches(&self, offer: &Offer) -> bool {
        self.listing_id.as_ref().is_none_or(|id| *id == offer.listing_id)
            && self.offerer_id.as_ref().is_none_or(|id| *id == offer.offerer_id)
    }
}

/// Fractional digits a stored price keeps.
pub const PRICE_SCALE: u32 = 2;
/// Integer digits a stored price keeps.
pub const PRICE_INTEGER_DIGITS: u32 = 12;

/// Prices must be non-negative and fit the stored precision exactly, so every
/// store returns the amount the offerer submitted.
///
/// # Errors
/// Returns `AppError::InvalidArgument` if `price` is negative, has more than
/// two decimal places or is too large.
pub fn validate_price(price: Option<Decimal>) -> Result<()> {
    let Some(p) = price else {
        return Ok(());
    };
    if p.is_sign_negative() && !p.is_zero() {
        return Err(AppError::invalid("price must not be negative"));
    }
    if p.normalize().scale() > PRICE_SCALE {
        return Err(AppError::invalid(format!("price must have at most {PRICE_SCALE} decimal places")));
    }
    if p >= Decimal::from(10_i64.pow(PRICE_INTEGER_DIGITS)) {
        return Err(AppError::invalid(format!("price must be below 10^{PRICE_INTEGER_DIGITS}")));
    }
    Ok(())
}
