//! The key-value contract the throttle store depends on.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::persistence::error::PersistenceError;

/// A shared key-value store supporting atomic set-with-expiry and existence
/// checks.
///
/// Implementations must be safe to call concurrently from the ingress and
/// worker tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Creates or refreshes `key` with the given time-to-live.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), PersistenceError>;

    /// Returns true iff `key` currently exists and has not expired.
    async fn exists(&self, key: &str) -> Result<bool, PersistenceError>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<(), PersistenceError>;
}
