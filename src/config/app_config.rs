use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::{deserialize_duration_from_ms, deserialize_duration_from_seconds};

/// Provides the default value for listen_address.
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Provides the default value for suppression_window_secs.
fn default_suppression_window() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for kv_timeout_ms.
fn default_kv_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Provides the default value for shutdown_timeout.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Application configuration for Vigil.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// AMQP URI of the message broker.
    pub amqp_url: String,

    /// URL of the shared key-value store used for throttling.
    pub redis_url: String,

    /// Address the ingress HTTP server binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Exchange and queue topology settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Retry and backoff policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// The suppression window applied to delivered fingerprints.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_suppression_window"
    )]
    pub suppression_window_secs: Duration,

    /// Per-call timeout for key-value store operations.
    #[serde(deserialize_with = "deserialize_duration_from_ms", default = "default_kv_timeout")]
    pub kv_timeout_ms: Duration,

    /// The maximum time in seconds to wait for graceful shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    /// Path to the routing configuration file.
    #[serde(skip_deserializing)]
    pub routes_config_path: PathBuf,
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading from the configuration directory.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)))
            .add_source(Environment::with_prefix("VIGIL").separator("__"))
            .build()?;
        let mut config: Self = s.try_deserialize()?;

        // Resolve the routes file relative to the config directory.
        config.routes_config_path = Path::new(config_dir_str).join("routes.yaml");

        Ok(config)
    }
}

/// Provides the default value for the exchange name.
fn default_exchange() -> String {
    "vigil.alerts".to_string()
}

/// Provides the default value for the incoming queue name.
fn default_incoming_queue() -> String {
    "vigil.incoming".to_string()
}

/// Provides the default value for the retry queue name.
fn default_retry_queue() -> String {
    "vigil.retry".to_string()
}

/// Provides the default value for the dead-letter queue name.
fn default_dead_letter_queue() -> String {
    "vigil.dead_letter".to_string()
}

/// Provides the default value for prefetch.
fn default_prefetch() -> u16 {
    16
}

/// Broker topology configuration.
///
/// Queue names double as routing keys on the direct exchange.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// The durable exchange all three queues bind to.
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// The queue workers consume from.
    #[serde(default = "default_incoming_queue")]
    pub incoming_queue: String,

    /// The delay queue that dead-letters back into incoming.
    #[serde(default = "default_retry_queue")]
    pub retry_queue: String,

    /// The terminal queue for exhausted messages.
    #[serde(default = "default_dead_letter_queue")]
    pub dead_letter_queue: String,

    /// Maximum unacknowledged deliveries per worker.
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            incoming_queue: default_incoming_queue(),
            retry_queue: default_retry_queue(),
            dead_letter_queue: default_dead_letter_queue(),
            prefetch: default_prefetch(),
        }
    }
}

/// Provides the default value for max_retries.
fn default_max_retries() -> u32 {
    3
}

/// Provides the default value for base_delay_ms.
fn default_base_delay() -> Duration {
    Duration::from_millis(5_000)
}

/// Provides the default value for max_delay_ms.
fn default_max_delay() -> Duration {
    Duration::from_millis(60_000)
}

/// Provides the default value for publish_attempts.
fn default_publish_attempts() -> u32 {
    3
}

/// Provides the default value for publish_backoff_ms.
fn default_publish_backoff() -> Duration {
    Duration::from_millis(200)
}

/// Configuration for the retry and backoff policy.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Attempts before a failing alert is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base re-delivery delay, doubled per retry.
    #[serde(deserialize_with = "deserialize_duration_from_ms", default = "default_base_delay")]
    pub base_delay_ms: Duration,

    /// Cap on the re-delivery delay; also the retry queue's message TTL.
    #[serde(deserialize_with = "deserialize_duration_from_ms", default = "default_max_delay")]
    pub max_delay_ms: Duration,

    /// Ingress-side publish attempts before an alert is reported failed.
    #[serde(default = "default_publish_attempts")]
    pub publish_attempts: u32,

    /// Initial backoff between ingress publish attempts, doubled per attempt.
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        default = "default_publish_backoff"
    )]
    pub publish_backoff_ms: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            publish_attempts: default_publish_attempts(),
            publish_backoff_ms: default_publish_backoff(),
        }
    }
}
