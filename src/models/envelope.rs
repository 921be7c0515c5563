//! The queue-transported wrapper around an alert.

use serde::{Deserialize, Serialize};

use crate::models::alert::AlertEvent;

/// An alert together with its retry metadata.
///
/// On the wire the alert is the JSON message body and `retry_count` travels
/// in the `x-retry-count` message header; this struct is the in-process view
/// the worker reassembles from a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope {
    /// The wrapped alert.
    pub alert: AlertEvent,

    /// Number of failed attempts so far. Zero on first publish.
    #[serde(default)]
    pub retry_count: u32,
}

impl QueueEnvelope {
    /// Wraps a freshly ingested alert with a zero retry count.
    pub fn new(alert: AlertEvent) -> Self {
        Self { alert, retry_count: 0 }
    }
}
