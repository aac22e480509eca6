pub mod auth;
pub mod conversation;
pub mod listing;
pub mod message;
pub mod notification;
pub mod offer;
pub mod page;
pub mod rating;
pub mod user;
