use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{models::alert::AlertEvent, queue::error::QueueError};

/// The publishing contract the ingress and worker depend on.
///
/// The broker-backed implementation persists every message and awaits the
/// broker's confirmation before reporting success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Publishes a freshly ingested alert to the incoming queue with a zero
    /// retry count.
    async fn publish(&self, alert: &AlertEvent) -> Result<(), QueueError>;

    /// Publishes a retry copy to the delay queue, carrying the incremented
    /// retry count and a delay derived from it.
    async fn publish_retry(&self, alert: &AlertEvent, retry_count: u32) -> Result<(), QueueError>;
}
