use crate::error::AppError;
use crate::services::rating_service::RatingService;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Re-derives every materialized trust score on a fixed interval, repairing
/// drift left by partially failed submissions.
#[derive(Debug)]
pub struct TrustReconcileWorker {
    service: RatingService,
    interval: Duration,
}

impl TrustReconcileWorker {
    #[must_use]
    pub const fn new(service: RatingService, interval_secs: u64) -> Self {
        Self { service, interval: Duration::from_secs(interval_secs) }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile()
                        .instrument(tracing::info_span!("trust_reconcile_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Trust reconcile iteration failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Trust reconcile loop shutting down...");
    }

    /// # Errors
    /// Returns the store error if the rated users cannot be listed.
    pub async fn reconcile(&self) -> Result<(), AppError> {
        let report = self.service.recompute_all().await?;
        if report.failed > 0 {
            tracing::warn!(recomputed = report.recomputed, failed = report.failed, "Trust reconcile finished with failures");
        } else {
            tracing::debug!(recomputed = report.recomputed, "Trust reconcile finished");
        }
        Ok(())
    }
}
