use crate::config::NotificationConfig;
use crate::domain::notification::ConversationEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod distributed;

pub use distributed::DistributedChangeNotifier;

/// Fan-out of conversation changes to live subscribers.
///
/// Delivery is at-least-once while a receiver is attached and nothing is
/// replayed for receivers attached later. Dropping the receiver cancels the
/// subscription.
#[async_trait]
pub trait ChangeNotifier: Send + Sync + std::fmt::Debug {
    async fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<ConversationEvent>;

    /// Never fails the caller; delivery problems are logged and counted.
    async fn publish(&self, conversation_id: Uuid, event: ConversationEvent);

    /// Drops channels whose last receiver is gone.
    fn perform_gc(&self);
}

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) published_total: Counter<u64>,
    pub(crate) received_total: Counter<u64>,
    pub(crate) unrouted_total: Counter<u64>,
    active_channels: UpDownCounter<i64>,
    gc_duration_seconds: Histogram<f64>,
    gc_reclaimed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            published_total: meter
                .u64_counter("bazaar_notifications_published_total")
                .with_description("Conversation events handed to the notifier")
                .build(),
            received_total: meter
                .u64_counter("bazaar_notifications_received_total")
                .with_description("Conversation events received from pub/sub")
                .build(),
            unrouted_total: meter
                .u64_counter("bazaar_notifications_unrouted_total")
                .with_description("Conversation events with no local subscriber")
                .build(),
            active_channels: meter
                .i64_up_down_counter("bazaar_notification_channels")
                .with_description("Open per-conversation broadcast channels")
                .build(),
            gc_duration_seconds: meter
                .f64_histogram("bazaar_notification_gc_duration_seconds")
                .with_description("Time taken by one channel GC pass")
                .build(),
            gc_reclaimed_total: meter
                .u64_counter("bazaar_notification_channels_reclaimed_total")
                .with_description("Channels reclaimed by GC")
                .build(),
        }
    }
}

/// Per-conversation broadcast channels living in this process.
#[derive(Debug)]
pub(crate) struct ChannelRegistry {
    channels: DashMap<Uuid, broadcast::Sender<ConversationEvent>>,
    capacity: usize,
    pub(crate) metrics: Metrics,
}

impl ChannelRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { channels: DashMap::new(), capacity: capacity.max(1), metrics: Metrics::new() }
    }

    pub(crate) fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<ConversationEvent> {
        // Subscribing under the entry guard keeps GC from reclaiming the sender in between.
        self.channels
            .entry(conversation_id)
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[]);
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Hands `event` to local receivers. Returns `false` if nobody is listening here.
    pub(crate) fn dispatch(&self, conversation_id: Uuid, event: ConversationEvent) -> bool {
        let label = event.label();
        let delivered = self.channels.get(&conversation_id).is_some_and(|tx| tx.send(event).is_ok());

        if delivered {
            tracing::trace!(%conversation_id, event = label, "Dispatched to local channel");
        } else {
            tracing::debug!(%conversation_id, event = label, "No local subscriber for event");
            self.metrics.unrouted_total.add(1, &[KeyValue::new("event", label)]);
        }
        delivered
    }

    pub(crate) fn perform_gc(&self) {
        let start = std::time::Instant::now();
        let mut reclaimed = 0;

        self.channels.retain(|_, sender| {
            let active = sender.receiver_count() > 0;
            if !active {
                self.metrics.active_channels.add(-1, &[]);
                reclaimed += 1;
            }
            active
        });

        self.metrics.gc_duration_seconds.record(start.elapsed().as_secs_f64(), &[]);
        if reclaimed > 0 {
            self.metrics.gc_reclaimed_total.add(reclaimed, &[]);
            tracing::info!(reclaimed, "Notification channel GC reclaimed stale channels");
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

/// Single-node notifier: publishing dispatches straight into local channels.
#[derive(Clone, Debug)]
pub struct LocalChangeNotifier {
    registry: Arc<ChannelRegistry>,
}

impl LocalChangeNotifier {
    #[must_use]
    pub fn new(config: &NotificationConfig) -> Self {
        Self { registry: Arc::new(ChannelRegistry::new(config.conversation_channel_capacity)) }
    }
}

#[async_trait]
impl ChangeNotifier for LocalChangeNotifier {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<ConversationEvent> {
        self.registry.subscribe(conversation_id)
    }

    #[tracing::instrument(level = "debug", skip(self, event), fields(event = event.label()))]
    async fn publish(&self, conversation_id: Uuid, event: ConversationEvent) {
        let label = event.label();
        self.registry.dispatch(conversation_id, event);
        self.registry.metrics.published_total.add(1, &[KeyValue::new("event", label), KeyValue::new("status", "local")]);
    }

    fn perform_gc(&self) {
        self.registry.perform_gc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deleted(id: Uuid) -> ConversationEvent {
        ConversationEvent::MessageDeleted { message_id: id }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_of_the_conversation() {
        let notifier = LocalChangeNotifier::new(&NotificationConfig::default());
        let conversation = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut first = notifier.subscribe(conversation).await;
        let mut second = notifier.subscribe(conversation).await;
        let mut unrelated = notifier.subscribe(other).await;

        let message_id = Uuid::new_v4();
        notifier.publish(conversation, deleted(message_id)).await;

        assert_eq!(first.recv().await.expect("first"), deleted(message_id));
        assert_eq!(second.recv().await.expect("second"), deleted(message_id));
        assert!(unrelated.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let notifier = LocalChangeNotifier::new(&NotificationConfig::default());
        notifier.publish(Uuid::new_v4(), deleted(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn test_gc_reclaims_channels_without_receivers() {
        let notifier = LocalChangeNotifier::new(&NotificationConfig::default());
        let active = Uuid::new_v4();
        let stale = Uuid::new_v4();

        let _kept = notifier.subscribe(active).await;
        drop(notifier.subscribe(stale).await);
        assert_eq!(notifier.registry.len(), 2);

        notifier.perform_gc();

        assert_eq!(notifier.registry.len(), 1, "GC should reclaim exactly the stale channel");

        // A reclaimed conversation can be subscribed to again.
        let mut again = notifier.subscribe(stale).await;
        let id = Uuid::new_v4();
        notifier.publish(stale, deleted(id)).await;
        assert_eq!(again.recv().await.expect("resubscribed"), deleted(id));
    }
}
