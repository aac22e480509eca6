use crate::domain::notification::ConversationEvent;
use crate::error::Result;
use crate::services::message_service::MessageService;
use std::collections::VecDeque;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ordered live view of one conversation for one subscriber.
///
/// Notifications only wake the feed up: appended messages are pulled from the
/// ledger past a cursor, so they come out in `created_at` order with no gaps
/// even when notifications from several nodes interleave or a receiver lags.
///
/// Deletions and offer updates are not in the ledger. When the receiver lags,
/// any of those lost in the gap cannot be replayed, so the feed follows the
/// recovered messages with [`ConversationEvent::Resync`] and the client re-lists.
#[derive(Debug)]
pub struct ConversationFeed {
    conversation_id: Uuid,
    messages: MessageService,
    receiver: broadcast::Receiver<ConversationEvent>,
    cursor: Option<OffsetDateTime>,
    batch_limit: i64,
    pending: VecDeque<ConversationEvent>,
    // Set while the ledger may hold messages past the cursor. Survives a
    // cancelled `next` so the wake-up is not lost.
    stale: bool,
    lagged: bool,
}

impl ConversationFeed {
    pub(crate) fn new(
        conversation_id: Uuid,
        messages: MessageService,
        receiver: broadcast::Receiver<ConversationEvent>,
        cursor: Option<OffsetDateTime>,
        batch_limit: i64,
    ) -> Self {
        Self {
            conversation_id,
            messages,
            receiver,
            cursor,
            batch_limit: batch_limit.max(1),
            pending: VecDeque::new(),
            stale: false,
            lagged: false,
        }
    }

    #[must_use]
    pub const fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Next event for the subscriber, or `None` once the notifier has gone away.
    ///
    /// # Errors
    /// Returns the store error if pulling appended messages fails. The feed
    /// stays usable; the next call retries from the same cursor.
    pub async fn next(&mut self) -> Result<Option<ConversationEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.stale {
                self.pull().await?;
                continue;
            }

            match self.receiver.recv().await {
                Ok(ConversationEvent::MessageAppended { message }) => {
                    if self.cursor.is_none_or(|cursor| message.created_at > cursor) {
                        self.stale = true;
                    }
                }
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, conversation_id = %self.conversation_id, "Feed lagged, resyncing");
                    self.stale = true;
                    self.lagged = true;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Drains every message newer than the cursor into `pending`.
    #[tracing::instrument(
        level = "debug",
        err(level = "debug"),
        skip(self),
        fields(conversation_id = %self.conversation_id, pulled = tracing::field::Empty)
    )]
    async fn pull(&mut self) -> Result<()> {
        let mut pulled = 0usize;
        loop {
            let batch = self.messages.list_after(self.conversation_id, self.cursor, self.batch_limit).await?;
            let full = i64::try_from(batch.len()).is_ok_and(|n| n >= self.batch_limit);

            self.messages.metrics.feed_batch_size.record(batch.len() as u64, &[]);
            if let Some(last) = batch.last() {
                self.cursor = Some(last.created_at);
            }
            pulled += batch.len();
            self.pending.extend(batch.into_iter().map(|message| ConversationEvent::MessageAppended { message }));

            if !full {
                break;
            }
        }
        self.stale = false;
        if std::mem::take(&mut self.lagged) {
            self.pending.push_back(ConversationEvent::Resync);
        }
        tracing::Span::current().record("pulled", pulled);
        Ok(())
    }
}
