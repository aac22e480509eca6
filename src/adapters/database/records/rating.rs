use crate::domain::rating::Rating;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct RatingRecord {
    pub(crate) id: Uuid,
    pub(crate) rater_id: String,
    pub(crate) rated_user_id: String,
    pub(crate) value: i32,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl From<RatingRecord> for Rating {
    fn from(record: RatingRecord) -> Self {
        Self {
            id: record.id,
            rater_id: record.rater_id,
            rated_user_id: record.rated_user_id,
            value: record.value,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
