use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The slice of the user-profile record this core reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Materialized trust score, `None` until the first rating lands.
    pub rating: Option<Decimal>,
}
