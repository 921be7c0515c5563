//! A set of helpers for testing

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    config::{AppConfig, QueueConfig, RetryConfig},
    models::alert::{AlertEvent, AlertStatus, LABEL_ALERT_NAME, LABEL_INSTANCE},
    notification::{Notifier, NotifierError},
    queue::{AlertPublisher, QueueError},
};

/// A builder for creating `AlertEvent` instances for testing.
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    status: AlertStatus,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl AlertBuilder {
    /// Creates a builder for an alert with the given name label.
    pub fn new(alert_name: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_ALERT_NAME.to_string(), alert_name.to_string());
        Self { status: AlertStatus::Firing, labels, annotations: BTreeMap::new() }
    }

    /// Sets the target identity (instance label).
    pub fn instance(mut self, instance: &str) -> Self {
        self.labels.insert(LABEL_INSTANCE.to_string(), instance.to_string());
        self
    }

    /// Adds a label.
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds an annotation.
    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the alert status.
    pub fn status(mut self, status: AlertStatus) -> Self {
        self.status = status;
        self
    }

    /// Builds the `AlertEvent` with a fixed start timestamp.
    pub fn build(self) -> AlertEvent {
        AlertEvent {
            status: self.status,
            labels: self.labels,
            annotations: self.annotations,
            starts_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            ends_at: None,
        }
    }
}

/// An `AlertPublisher` that records published alerts in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    /// Alerts published to the incoming queue.
    pub published: Mutex<Vec<AlertEvent>>,
    /// `(alert, retry_count)` pairs published to the retry queue.
    pub retries: Mutex<Vec<(AlertEvent, u32)>>,
}

#[async_trait]
impl AlertPublisher for RecordingPublisher {
    async fn publish(&self, alert: &AlertEvent) -> Result<(), QueueError> {
        self.published.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn publish_retry(&self, alert: &AlertEvent, retry_count: u32) -> Result<(), QueueError> {
        self.retries.lock().unwrap().push((alert.clone(), retry_count));
        Ok(())
    }
}

/// A `Notifier` that records handed-off messages in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    /// `(alert name, message)` pairs in hand-off order.
    pub messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &AlertEvent, message: &str) -> Result<(), NotifierError> {
        self.messages
            .lock()
            .unwrap()
            .push((alert.name().unwrap_or("unknown").to_string(), message.to_string()));
        Ok(())
    }
}

/// An `AppConfig` with local defaults for tests.
pub fn test_config() -> AppConfig {
    AppConfig {
        amqp_url: "amqp://localhost:5672".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        listen_address: "127.0.0.1:0".to_string(),
        queue: QueueConfig::default(),
        retry: RetryConfig {
            publish_backoff_ms: Duration::from_millis(1),
            ..Default::default()
        },
        suppression_window_secs: Duration::from_secs(30),
        kv_timeout_ms: Duration::from_millis(100),
        shutdown_timeout: Duration::from_secs(5),
        routes_config_path: PathBuf::from("configs/routes.yaml"),
    }
}
