use crate::services::notification::ChangeNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Periodically reclaims notification channels nobody listens on.
#[derive(Debug)]
pub struct ChannelGcWorker {
    notifier: Arc<dyn ChangeNotifier>,
    interval: Duration,
}

impl ChannelGcWorker {
    #[must_use]
    pub fn new(notifier: Arc<dyn ChangeNotifier>, gc_interval_secs: u64) -> Self {
        Self { notifier, interval: Duration::from_secs(gc_interval_secs.max(1)) }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut gc_interval = tokio::time::interval(self.interval);
        tracing::info!(interval_secs = self.interval.as_secs(), "Channel GC worker started");

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = gc_interval.tick() => {
                    async {
                        self.notifier.perform_gc();
                    }
                    .instrument(tracing::debug_span!("channel_gc_iteration"))
                    .await;
                }
            }
        }

        tracing::info!("Channel GC worker shutting down...");
    }
}
