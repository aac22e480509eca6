#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::DbPool;
use crate::adapters::memory::MemoryStore;
use crate::adapters::redis::RedisClient;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::notification::{ChangeNotifier, DistributedChangeNotifier, LocalChangeNotifier};
use crate::services::offer_service::OfferService;
use crate::services::ports::Stores;
use crate::services::rating_service::RatingService;
use crate::workers::{ChannelGcWorker, TrustReconcileWorker};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Wires stores, notifier, services and workers together.
///
/// Without a database the state lives in a [`MemoryStore`]; without pub/sub
/// realtime fan-out stays inside this process.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    memory: Option<Arc<MemoryStore>>,
    pubsub: Option<Arc<RedisClient>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, memory: None, pubsub: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Uses the given in-memory store instead of a fresh one, so callers can seed it.
    #[must_use]
    pub fn with_memory_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<RedisClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// # Errors
    /// Returns an error if the distributed notifier cannot subscribe to pub/sub.
    pub async fn build(self) -> anyhow::Result<App> {
        let shutdown_rx = self.shutdown_rx.unwrap_or_else(|| watch::channel(false).1);

        let stores = match (&self.pool, self.memory) {
            (Some(pool), _) => adapters::database::stores(pool),
            (None, Some(memory)) => adapters::memory::stores(&memory),
            (None, None) => {
                tracing::warn!("No database configured, state is kept in memory");
                adapters::memory::stores(&Arc::new(MemoryStore::new()))
            }
        };

        let notifier: Arc<dyn ChangeNotifier> = match &self.pubsub {
            Some(pubsub) => Arc::new(
                DistributedChangeNotifier::new(Arc::clone(pubsub), &self.config.notifications, shutdown_rx.clone())
                    .await?,
            ),
            None => Arc::new(LocalChangeNotifier::new(&self.config.notifications)),
        };

        let services = Self::services(&self.config, &stores, &notifier);

        let health_service = HealthService::new(
            self.pool,
            self.pubsub,
            self.config.database.health_timeout_ms,
            self.config.pubsub.health_timeout_ms,
        );

        let trust_reconcile = match self.config.workers.trust_reconcile_interval_secs {
            0 => None,
            secs => Some(TrustReconcileWorker::new(services.rating_service.clone(), secs)),
        };

        let workers = Workers {
            channel_gc: ChannelGcWorker::new(notifier, self.config.notifications.gc_interval_secs),
            trust_reconcile,
        };

        Ok(App { services, health_service, workers })
    }

    fn services(config: &Config, stores: &Stores, notifier: &Arc<dyn ChangeNotifier>) -> ServiceContainer {
        ServiceContainer {
            conversation_service: ConversationService::new(Arc::clone(&stores.conversations)),
            message_service: MessageService::new(
                Arc::clone(&stores.conversations),
                Arc::clone(&stores.messages),
                Arc::clone(notifier),
                config.messaging.clone(),
            ),
            offer_service: OfferService::new(
                Arc::clone(&stores.offers),
                Arc::clone(&stores.listings),
                Arc::clone(&stores.conversations),
                Arc::clone(notifier),
            ),
            rating_service: RatingService::new(Arc::clone(&stores.ratings), Arc::clone(&stores.users)),
        }
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

#[derive(Debug)]
pub struct Workers {
    channel_gc: ChannelGcWorker,
    trust_reconcile: Option<TrustReconcileWorker>,
}

impl Workers {
    /// Starts every background loop; each stops when `shutdown_rx` flips to true.
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![tokio::spawn(
            self.channel_gc.run(shutdown_rx.clone()).instrument(tracing::info_span!("channel_gc_worker")),
        )];

        if let Some(worker) = self.trust_reconcile {
            tasks.push(tokio::spawn(worker.run(shutdown_rx).instrument(tracing::info_span!("trust_reconcile_worker"))));
        } else {
            tracing::info!("Trust reconcile worker disabled");
        }

        tasks
    }
}

/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Flips the shutdown signal on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining connections");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        tracing::error!(location = %location, payload = %payload, "Panic occurred");
    }));
}
