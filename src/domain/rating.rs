use crate::error::{AppError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Uuid,
    pub rater_id: String,
    pub rated_user_id: String,
    pub value: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Count and integer sum of a user's ratings, read in one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingStats {
    pub count: i64,
    pub sum: i64,
}

impl RatingStats {
    /// Mean rounded to one decimal place, half away from zero. `None` when unrated.
    ///
    /// Computed from the integer sum so repeated recomputation never accumulates
    /// floating point error.
    #[must_use]
    pub fn mean(&self) -> Option<Decimal> {
        if self.count <= 0 {
            return None;
        }
        let mean = Decimal::from(self.sum) / Decimal::from(self.count);
        Some(mean.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
    }
}

/// # Errors
/// Returns `AppError::InvalidRating` for self-ratings or values outside 1..=5.
pub fn validate(rater_id: &str, rated_user_id: &str, value: i32) -> Result<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(AppError::InvalidRating(format!("rating must be between {MIN_RATING} and {MAX_RATING}")));
    }
    if rater_id.trim().is_empty() || rated_user_id.trim().is_empty() {
        return Err(AppError::InvalidRating("rater and rated user are required".into()));
    }
    if rater_id == rated_user_id {
        return Err(AppError::InvalidRating("users cannot rate themselves".into()));
    }
    Ok(())
}
