//! The canonical alert type flowing through the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label key carrying the alert's name, the primary routing identity.
pub const LABEL_ALERT_NAME: &str = "alertname";

/// Label key carrying the target identity (host or instance).
pub const LABEL_INSTANCE: &str = "instance";

/// Sentinel used wherever an identity label is absent.
pub const UNKNOWN: &str = "unknown";

/// The lifecycle status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// The alert condition is active.
    Firing,
    /// The alert condition has cleared.
    Resolved,
}

/// A single alert as produced by a source-specific translator.
///
/// Immutable once ingested; retry metadata lives in the queue envelope, not
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    /// Whether the alert is firing or resolved.
    pub status: AlertStatus,

    /// Identity and routing labels. Expected to contain `alertname` and
    /// `instance`; missing identity fields degrade to the `unknown` sentinel.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Free-form description fields. Irrelevant to routing.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// When the alert started firing.
    pub starts_at: DateTime<Utc>,

    /// When the alert resolved. Absent while firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    /// Returns the value of a label, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Returns the alert's name label, if present.
    pub fn name(&self) -> Option<&str> {
        self.label(LABEL_ALERT_NAME)
    }

    /// Returns the alert's target identity (instance label) or the `unknown`
    /// sentinel.
    pub fn target(&self) -> &str {
        self.label(LABEL_INSTANCE).unwrap_or(UNKNOWN)
    }
}

/// The request body accepted by the ingress endpoint: a batch of
/// pre-translated alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertBatch {
    /// The alerts to enqueue.
    #[serde(default)]
    pub alerts: Vec<AlertEvent>,
}
