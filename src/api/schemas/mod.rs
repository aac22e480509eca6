pub mod conversations;
pub mod events;
pub mod health;
pub mod messages;
pub mod offers;
pub mod ratings;

use crate::config::PaginationConfig;
use crate::domain::page::Page;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    #[must_use]
    pub fn page(&self, config: &PaginationConfig) -> Page {
        Page::from_request(self.offset, self.limit, config)
    }
}
