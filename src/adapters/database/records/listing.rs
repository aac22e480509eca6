use crate::domain::listing::Listing;

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRecord {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) image: Option<String>,
    pub(crate) owner_id: String,
}

impl From<ListingRecord> for Listing {
    fn from(record: ListingRecord) -> Self {
        Self { id: record.id, title: record.title, image: record.image, owner_id: record.owner_id }
    }
}
