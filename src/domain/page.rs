use crate::config::PaginationConfig;

/// A restartable offset/limit window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    #[must_use]
    pub const fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// Clamps a client-supplied window: negative offsets become 0, missing or
    /// non-positive limits fall back to the default, large limits are capped.
    #[must_use]
    pub fn from_request(offset: Option<i64>, limit: Option<i64>, config: &PaginationConfig) -> Self {
        let offset = offset.unwrap_or(0).max(0);
        let limit = match limit {
            Some(l) if l > 0 => l.min(config.max_page_size),
            _ => config.default_page_size,
        };
        Self { offset, limit }
    }

    #[must_use]
    pub(crate) fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset).unwrap_or(0);
        let take = usize::try_from(self.limit).unwrap_or(0);
        items.iter().skip(start).take(take).cloned().collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { offset: 0, limit: 50 }
    }
}
