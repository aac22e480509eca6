use crate::domain::rating::Rating;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingRequest {
    pub rated_user_id: String,
    pub value: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingResponse {
    pub rating: Rating,
    /// The rated user's trust score after this submission.
    pub aggregate: Option<Decimal>,
}
