//! Suppression-window tracking for recently delivered alerts.
//!
//! The primary backend is the shared key-value store; when it is unreachable
//! the store degrades transparently to an in-process map. The fallback is
//! local to one process and does not survive restart or coordinate across
//! replicas, an accepted limitation of degraded operation.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::persistence::traits::KeyValueStore;

/// Namespace prefix for throttle keys in the shared store.
const THROTTLE_NS: &str = "vigil:throttle:";

/// Which backend answered the most recent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleBackend {
    /// The shared key-value store.
    Primary,
    /// The in-process map.
    Fallback,
}

/// A snapshot of the throttle store's operational state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStats {
    /// The backend currently serving calls.
    pub backend: ThrottleBackend,

    /// Number of live records in the in-process fallback map.
    pub count: usize,

    /// Whether the last primary-backend call succeeded.
    pub backend_connected: bool,
}

/// Records "recently delivered" fingerprints with an expiry.
///
/// All backend errors are caught and logged here; no call ever surfaces a
/// backend failure to the caller. On transient primary errors suppression
/// defaults to "not suppressed" unless the fallback map knows better, so real
/// alerts are never silently dropped.
pub struct ThrottleStore {
    primary: Option<Arc<dyn KeyValueStore>>,
    fallback: DashMap<String, DateTime<Utc>>,
    primary_healthy: AtomicBool,
}

impl ThrottleStore {
    /// Creates a throttle store over an optional primary backend.
    ///
    /// Passing `None` (e.g. when the shared store was unreachable at startup)
    /// runs the store in fallback mode from the first call.
    pub fn new(primary: Option<Arc<dyn KeyValueStore>>) -> Self {
        let connected = primary.is_some();
        Self {
            primary,
            fallback: DashMap::new(),
            primary_healthy: AtomicBool::new(connected),
        }
    }

    /// Returns true iff an equivalent alert was delivered within the
    /// suppression window.
    pub async fn suppressed(&self, key: &str, ttl: Duration) -> bool {
        if let Some(primary) = &self.primary {
            match primary.exists(&Self::namespaced(key)).await {
                Ok(found) => {
                    self.primary_healthy.store(true, Ordering::Relaxed);
                    return found;
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Throttle primary backend failed on existence check, using fallback.");
                    self.primary_healthy.store(false, Ordering::Relaxed);
                }
            }
        }
        self.fallback_suppressed(key, ttl, Utc::now())
    }

    /// Creates or refreshes the suppression record for `key`.
    pub async fn mark(&self, key: &str, ttl: Duration) {
        if let Some(primary) = &self.primary {
            match primary.set_with_expiry(&Self::namespaced(key), "1", ttl).await {
                Ok(()) => {
                    self.primary_healthy.store(true, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Throttle primary backend failed on mark, using fallback.");
                    self.primary_healthy.store(false, Ordering::Relaxed);
                }
            }
        }
        self.prune_fallback(ttl, Utc::now());
        self.fallback.insert(key.to_string(), Utc::now());
    }

    /// Reports the active backend and fallback occupancy.
    pub fn stats(&self) -> ThrottleStats {
        let connected = self.primary_healthy.load(Ordering::Relaxed);
        let backend = if self.primary.is_some() && connected {
            ThrottleBackend::Primary
        } else {
            ThrottleBackend::Fallback
        };
        ThrottleStats { backend, count: self.fallback.len(), backend_connected: connected }
    }

    fn namespaced(key: &str) -> String {
        format!("{THROTTLE_NS}{key}")
    }

    /// Suppression in the fallback map: `now - last_marked < ttl`.
    fn fallback_suppressed(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        let window = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.fallback
            .get(key)
            .map(|marked| now.signed_duration_since(*marked) < window)
            .unwrap_or(false)
    }

    /// Drops fallback entries older than the caller's window to bound growth.
    fn prune_fallback(&self, ttl: Duration, now: DateTime<Utc>) {
        let window = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.fallback.retain(|_, marked| now.signed_duration_since(*marked) < window);
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::persistence::{error::PersistenceError, traits::MockKeyValueStore};

    const TTL: Duration = Duration::from_secs(30);

    fn broken_backend() -> MockKeyValueStore {
        let mut kv = MockKeyValueStore::new();
        kv.expect_exists().returning(|_| {
            Err(PersistenceError::Timeout("EXISTS".to_string()))
        });
        kv.expect_set_with_expiry().returning(|_, _, _| {
            Err(PersistenceError::Timeout("SET EX".to_string()))
        });
        kv
    }

    #[tokio::test]
    async fn mark_then_suppressed_in_fallback_mode() {
        let store = ThrottleStore::new(None);

        assert!(!store.suppressed("fp1", TTL).await);
        store.mark("fp1", TTL).await;
        assert!(store.suppressed("fp1", TTL).await);
    }

    #[tokio::test]
    async fn suppression_expires_after_ttl() {
        let store = ThrottleStore::new(None);
        store.mark("fp1", TTL).await;

        let now = Utc::now();
        assert!(store.fallback_suppressed("fp1", TTL, now));
        assert!(!store.fallback_suppressed("fp1", TTL, now + chrono::Duration::seconds(31)));
    }

    #[tokio::test]
    async fn primary_errors_degrade_to_fallback() {
        let store = ThrottleStore::new(Some(Arc::new(broken_backend())));

        store.mark("fp1", TTL).await;
        assert!(store.suppressed("fp1", TTL).await);

        let stats = store.stats();
        assert_eq!(stats.backend, ThrottleBackend::Fallback);
        assert!(!stats.backend_connected);
        assert_eq!(stats.count, 1);
    }

    #[tokio::test]
    async fn transient_primary_errors_fail_open() {
        // Primary errors and the fallback has no record: not suppressed.
        let store = ThrottleStore::new(Some(Arc::new(broken_backend())));
        assert!(!store.suppressed("never-marked", TTL).await);
    }

    #[tokio::test]
    async fn healthy_primary_is_authoritative() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_exists()
            .with(eq("vigil:throttle:fp1"))
            .times(1)
            .returning(|_| Ok(true));
        let store = ThrottleStore::new(Some(Arc::new(kv)));

        assert!(store.suppressed("fp1", TTL).await);
        let stats = store.stats();
        assert_eq!(stats.backend, ThrottleBackend::Primary);
        assert!(stats.backend_connected);
    }

    #[tokio::test]
    async fn mark_writes_through_healthy_primary() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_set_with_expiry()
            .withf(|key, value, ttl| {
                key == "vigil:throttle:fp1" && value == "1" && *ttl == TTL
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let store = ThrottleStore::new(Some(Arc::new(kv)));

        store.mark("fp1", TTL).await;
        // The record lives in Redis, not the fallback map.
        assert_eq!(store.stats().count, 0);
    }

    #[tokio::test]
    async fn mark_prunes_expired_fallback_entries() {
        let store = ThrottleStore::new(None);
        store.fallback.insert("stale".to_string(), Utc::now() - chrono::Duration::seconds(120));

        store.mark("fresh", TTL).await;

        assert_eq!(store.stats().count, 1);
        assert!(store.suppressed("fresh", TTL).await);
        assert!(!store.suppressed("stale", TTL).await);
    }
}
