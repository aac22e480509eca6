use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::config::NotificationConfig;
use crate::domain::notification::{ConversationEvent, RealtimeNotification};
use crate::services::notification::{ChangeNotifier, ChannelRegistry};
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

const CHANNEL_PREFIX: &str = "conversation:";
const CHANNEL_PATTERN: &str = "conversation:*";

/// Multi-node notifier. Events are published to Redis on `conversation:{id}`
/// and every node re-dispatches what it receives into its local channels.
#[derive(Debug)]
pub struct DistributedChangeNotifier {
    pubsub: Arc<RedisClient>,
    registry: Arc<ChannelRegistry>,
}

impl DistributedChangeNotifier {
    /// Subscribes to the conversation pattern and starts the dispatcher task.
    ///
    /// # Errors
    /// Returns an error if the pub/sub subscription cannot be established.
    pub async fn new(
        pubsub: Arc<RedisClient>,
        config: &NotificationConfig,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(ChannelRegistry::new(config.conversation_channel_capacity));
        let incoming = pubsub.subscribe(CHANNEL_PATTERN).await?;

        tokio::spawn(
            Self::run_dispatcher(incoming, Arc::clone(&registry), shutdown)
                .instrument(tracing::info_span!("notification_dispatcher")),
        );

        Ok(Self { pubsub, registry })
    }

    async fn run_dispatcher(
        mut incoming: broadcast::Receiver<PubSubMessage>,
        registry: Arc<ChannelRegistry>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = incoming.recv() => match result {
                    Ok(message) => Self::route(&registry, &message),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Feeds resync from the ledger on their next wake-up.
                        tracing::warn!(missed, "Pub/sub dispatcher lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::error!("Pub/sub stream closed, dispatcher exiting");
                        break;
                    }
                },
            }
        }
    }

    fn route(registry: &ChannelRegistry, message: &PubSubMessage) {
        let Some(id) = message.channel.strip_prefix(CHANNEL_PREFIX) else {
            return;
        };
        let Ok(conversation_id) = Uuid::parse_str(id) else {
            tracing::warn!(channel = %message.channel, "Ignoring event on malformed channel");
            return;
        };

        match serde_json::from_slice::<RealtimeNotification>(&message.payload) {
            Ok(notification) if notification.conversation_id == conversation_id => {
                let label = notification.event.label();
                registry.metrics.received_total.add(1, &[KeyValue::new("event", label)]);
                registry.dispatch(conversation_id, notification.event);
            }
            Ok(_) => tracing::warn!(%conversation_id, "Ignoring event addressed to another conversation"),
            Err(e) => tracing::warn!(error = %e, %conversation_id, "Ignoring undecodable event"),
        }
    }
}

#[async_trait]
impl ChangeNotifier for DistributedChangeNotifier {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<ConversationEvent> {
        self.registry.subscribe(conversation_id)
    }

    #[tracing::instrument(level = "debug", skip(self, event), fields(event = event.label()))]
    async fn publish(&self, conversation_id: Uuid, event: ConversationEvent) {
        let label = event.label();
        let notification = RealtimeNotification { conversation_id, event };

        let payload = match serde_json::to_vec(&notification) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode conversation event");
                self.registry.metrics.published_total.add(1, &[KeyValue::new("event", label), KeyValue::new("status", "error")]);
                return;
            }
        };

        let channel = format!("{CHANNEL_PREFIX}{conversation_id}");
        if let Err(e) = self.pubsub.publish(&channel, &payload).await {
            // Local subscribers still hear about it when Redis is down.
            tracing::error!(error = %e, "Failed to publish to pub/sub, dispatching locally");
            self.registry.metrics.published_total.add(1, &[KeyValue::new("event", label), KeyValue::new("status", "fallback")]);
            self.registry.dispatch(conversation_id, notification.event);
        } else {
            self.registry.metrics.published_total.add(1, &[KeyValue::new("event", label), KeyValue::new("status", "sent")]);
        }
    }

    fn perform_gc(&self) {
        self.registry.perform_gc();
    }
}
