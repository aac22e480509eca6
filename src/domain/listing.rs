use serde::{Deserialize, Serialize};

/// Display context resolved from the listing catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub image: Option<String>,
    pub owner_id: String,
}
