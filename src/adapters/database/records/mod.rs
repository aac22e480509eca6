pub mod conversation;
pub mod listing;
pub mod message;
pub mod offer;
pub mod rating;
pub mod user;

pub use conversation::ConversationRecord;
pub use listing::ListingRecord;
pub use message::MessageRecord;
pub use offer::OfferRecord;
pub use rating::RatingRecord;
pub use user::UserRecord;
