use crate::domain::user::UserProfile;
use rust_decimal::Decimal;

#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub(crate) id: String,
    pub(crate) display_name: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) rating: Option<Decimal>,
}

impl From<UserRecord> for UserProfile {
    fn from(record: UserRecord) -> Self {
        Self { id: record.id, display_name: record.display_name, avatar_url: record.avatar_url, rating: record.rating }
    }
}
