pub mod conversation_service;
pub mod feed;
pub mod health_service;
pub mod message_service;
pub mod notification;
pub mod offer_service;
pub mod ports;
pub mod rating_service;
