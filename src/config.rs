use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub pagination: PaginationConfig,

    #[command(flatten)]
    pub notifications: NotificationConfig,

    #[command(flatten)]
    pub pubsub: PubSubConfig,

    #[command(flatten)]
    pub workers: WorkerConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "BAZAAR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "BAZAAR_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management server (health probes)
    #[arg(long, env = "BAZAAR_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks during shutdown
    #[arg(long, env = "BAZAAR_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Postgres connection URL. When unset, state is kept in memory.
    #[arg(id = "database_url", long = "database-url", env = "BAZAAR_DATABASE_URL")]
    pub url: Option<String>,

    #[arg(long = "db-max-connections", env = "BAZAAR_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    #[arg(long = "db-min-connections", env = "BAZAAR_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection before reporting the store unavailable
    #[arg(long = "db-acquire-timeout-secs", env = "BAZAAR_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 3)]
    pub acquire_timeout_secs: u64,

    #[arg(long = "db-idle-timeout-secs", env = "BAZAAR_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    #[arg(long = "db-max-lifetime-secs", env = "BAZAAR_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,

    /// Milliseconds allowed for the readiness probe query
    #[arg(id = "db_health_timeout_ms", long = "db-health-timeout-ms", env = "BAZAAR_DB_HEALTH_TIMEOUT_MS", default_value_t = 2000)]
    pub health_timeout_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Shared secret used to verify caller JWTs issued by the identity service
    #[arg(long, env = "BAZAAR_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client IP
    #[arg(long = "rate-limit-per-second", env = "BAZAAR_RATE_LIMIT_PER_SECOND", default_value_t = 10)]
    pub per_second: u32,

    /// Burst allowance per client IP
    #[arg(long = "rate-limit-burst", env = "BAZAAR_RATE_LIMIT_BURST", default_value_t = 20)]
    pub burst: u32,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Maximum number of characters in a message body
    #[arg(long, env = "BAZAAR_MAX_CONTENT_CHARS", default_value_t = 4000)]
    pub max_content_chars: usize,

    /// Maximum number of characters kept in a conversation preview
    #[arg(long, env = "BAZAAR_PREVIEW_MAX_CHARS", default_value_t = 120)]
    pub preview_max_chars: usize,

    /// Messages pulled per batch when feeding realtime subscribers
    #[arg(long, env = "BAZAAR_FEED_BATCH_LIMIT", default_value_t = 50)]
    pub feed_batch_limit: i64,
}

#[derive(Clone, Debug, Args)]
pub struct PaginationConfig {
    /// Page size used when a request does not specify one
    #[arg(long, env = "BAZAAR_DEFAULT_PAGE_SIZE", default_value_t = 50)]
    pub default_page_size: i64,

    /// Largest page size a request may ask for
    #[arg(long, env = "BAZAAR_MAX_PAGE_SIZE", default_value_t = 200)]
    pub max_page_size: i64,
}

#[derive(Clone, Debug, Args)]
pub struct NotificationConfig {
    /// Capacity of each per-conversation broadcast channel
    #[arg(long, env = "BAZAAR_CONVERSATION_CHANNEL_CAPACITY", default_value_t = 64)]
    pub conversation_channel_capacity: usize,

    /// Capacity of the channel carrying events received from pub/sub
    #[arg(long, env = "BAZAAR_GLOBAL_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub global_channel_capacity: usize,

    /// How often to reclaim channels without subscribers
    #[arg(long, env = "BAZAAR_GC_INTERVAL_SECS", default_value_t = 60)]
    pub gc_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct PubSubConfig {
    /// Redis URL used for cross-node fan-out. When unset, fan-out is process-local.
    #[arg(id = "pubsub_url", long = "pubsub-url", env = "BAZAAR_PUBSUB_URL")]
    pub url: Option<String>,

    #[arg(long = "pubsub-min-backoff-secs", env = "BAZAAR_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    #[arg(long = "pubsub-max-backoff-secs", env = "BAZAAR_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,

    #[arg(id = "pubsub_health_timeout_ms", long = "pubsub-health-timeout-ms", env = "BAZAAR_PUBSUB_HEALTH_TIMEOUT_MS", default_value_t = 2000)]
    pub health_timeout_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct WorkerConfig {
    /// How often to recompute every materialized trust rating. 0 disables the worker.
    #[arg(long, env = "BAZAAR_TRUST_RECONCILE_INTERVAL_SECS", default_value_t = 3600)]
    pub trust_reconcile_interval_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint. Traces and metrics are only exported when set.
    #[arg(long, env = "BAZAAR_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "BAZAAR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 3,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            health_timeout_ms: 2000,
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_content_chars: 4000, preview_max_chars: 120, feed_batch_limit: 50 }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { default_page_size: 50, max_page_size: 200 }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { conversation_channel_capacity: 64, global_channel_capacity: 1024, gc_interval_secs: 60 }
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self { url: None, min_backoff_secs: 1, max_backoff_secs: 30, health_timeout_ms: 2000 }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { trust_reconcile_interval_secs: 3600 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { otlp_endpoint: None, log_format: LogFormat::Text }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                mgmt_port: 9090,
                shutdown_timeout_secs: 5,
            },
            database: DatabaseConfig::default(),
            auth: AuthConfig { jwt_secret: String::new() },
            rate_limit: RateLimitConfig { per_second: 10, burst: 20 },
            messaging: MessagingConfig::default(),
            pagination: PaginationConfig::default(),
            notifications: NotificationConfig::default(),
            pubsub: PubSubConfig::default(),
            workers: WorkerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
