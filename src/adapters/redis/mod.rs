use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::Instrument;

/// A raw message received on a subscribed channel.
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

type Subscriptions = Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>;

/// Redis pub/sub transport shared by every node.
///
/// Publishing goes through a reconnecting `ConnectionManager`. Each subscribed
/// pattern owns one background listener that re-subscribes with exponential
/// backoff after a dropped connection and fans messages out to local receivers.
#[derive(Debug)]
pub struct RedisClient {
    client: redis::Client,
    publisher: redis::aio::ConnectionManager,
    subscriptions: Subscriptions,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    config: PubSubConfig,
}

impl RedisClient {
    /// Connects the publisher. Pattern listeners start lazily on first subscribe.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the initial connection fails.
    pub async fn connect(
        url: &str,
        config: &PubSubConfig,
        channel_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_connection_manager().await?;

        Ok(Arc::new(Self {
            client,
            publisher,
            subscriptions: Arc::new(DashMap::new()),
            shutdown,
            channel_capacity,
            config: config.clone(),
        }))
    }

    /// Publishes `payload` on `channel`, returning how many subscribers received it.
    ///
    /// # Errors
    /// Returns an error if Redis rejects the command or the connection is down.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> anyhow::Result<i64> {
        let mut conn = self.publisher.clone();
        let receivers = conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(receivers)
    }

    /// Subscribes to a channel pattern such as `conversation:*`.
    ///
    /// Waits until the first `PSUBSCRIBE` is acknowledged so nothing published
    /// after this returns is missed.
    ///
    /// # Errors
    /// Returns an error if the listener gave up before subscribing.
    pub async fn subscribe(&self, pattern: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        if let Some(tx) = self.subscriptions.get(pattern) {
            return Ok(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(self.channel_capacity);
        self.subscriptions.insert(pattern.to_string(), tx.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = PatternListener {
            client: self.client.clone(),
            pattern: pattern.to_string(),
            tx,
            subscriptions: Arc::clone(&self.subscriptions),
            config: self.config.clone(),
        };

        tokio::spawn(
            listener
                .run(self.shutdown.clone(), ready_tx)
                .instrument(tracing::info_span!("pubsub_listener", pattern = %pattern)),
        );

        ready_rx.await.map_err(|_| anyhow::anyhow!("pubsub listener for '{pattern}' stopped before subscribing"))?;
        Ok(rx)
    }

    /// # Errors
    /// Returns an error if the server does not answer.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.publisher.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

struct PatternListener {
    client: redis::Client,
    pattern: String,
    tx: broadcast::Sender<PubSubMessage>,
    subscriptions: Subscriptions,
    config: PubSubConfig,
}

impl PatternListener {
    async fn run(self, mut shutdown: watch::Receiver<bool>, ready_tx: oneshot::Sender<()>) {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(self.config.min_backoff_secs))
            .with_max_delay(Duration::from_secs(self.config.max_backoff_secs));
        let mut ready_tx = Some(ready_tx);

        while !*shutdown.borrow() {
            let subscribed = (|| async {
                let mut pubsub = self.client.get_async_pubsub().await?;
                pubsub.psubscribe(&self.pattern).await?;
                Ok::<redis::aio::PubSub, redis::RedisError>(pubsub)
            })
            .retry(&backoff)
            .notify(|e, delay| {
                tracing::warn!(error = %e, retry_in = ?delay, "Pubsub subscribe failed, retrying");
            })
            .await;

            let pubsub = match subscribed {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    tracing::error!(error = %e, "Pubsub subscribe failed after retries");
                    break;
                }
            };

            tracing::info!("Subscribed to pubsub pattern");
            if let Some(ready) = ready_tx.take() {
                let _ = ready.send(());
            }

            let mut stream = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    msg = stream.next() => {
                        let Some(msg) = msg else {
                            tracing::warn!("Pubsub connection lost, reconnecting");
                            break;
                        };
                        let message = PubSubMessage {
                            channel: msg.get_channel_name().to_string(),
                            payload: msg.get_payload().unwrap_or_default(),
                        };
                        // Dropped when no local receiver is attached.
                        let _ = self.tx.send(message);
                    }
                }
            }
        }

        self.subscriptions.remove(&self.pattern);
        tracing::debug!("Pubsub listener stopped");
    }
}
