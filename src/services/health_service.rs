use crate::adapters::database::DbPool;
use crate::adapters::redis::RedisClient;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            status: meter
                .i64_gauge("bazaar_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

/// Readiness checks for the optional backing services. A dependency that is
/// not configured (in-memory mode, single node) always reports healthy.
#[derive(Clone, Debug)]
pub struct HealthService {
    pool: Option<DbPool>,
    pubsub: Option<Arc<RedisClient>>,
    db_timeout: Duration,
    pubsub_timeout: Duration,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(
        pool: Option<DbPool>,
        pubsub: Option<Arc<RedisClient>>,
        db_timeout_ms: u64,
        pubsub_timeout_ms: u64,
    ) -> Self {
        Self {
            pool,
            pubsub,
            db_timeout: Duration::from_millis(db_timeout_ms),
            pubsub_timeout: Duration::from_millis(pubsub_timeout_ms),
            metrics: Metrics::new(),
        }
    }

    fn record(&self, component: &'static str, result: Result<(), String>) -> Result<(), String> {
        let value = i64::from(result.is_ok());
        self.metrics.status.record(value, &[KeyValue::new("component", component)]);
        result
    }

    /// # Errors
    /// Returns a description of the failure if the database is unreachable.
    pub async fn check_db(&self) -> Result<(), String> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        let result = match timeout(self.db_timeout, sqlx::query("SELECT 1").execute(pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Database connection failed: {e}")),
            Err(_) => Err("Database connection timed out".to_string()),
        };
        self.record("database", result)
    }

    /// # Errors
    /// Returns a description of the failure if pub/sub is unreachable.
    pub async fn check_pubsub(&self) -> Result<(), String> {
        let Some(pubsub) = &self.pubsub else {
            return Ok(());
        };

        let result = match timeout(self.pubsub_timeout, pubsub.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("PubSub connection failed: {e}")),
            Err(_) => Err("PubSub connection timed out".to_string()),
        };
        self.record("pubsub", result)
    }
}
