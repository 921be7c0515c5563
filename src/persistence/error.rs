//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// An error returned by the Redis backend.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// A backend call did not complete within its timeout.
    #[error("Key-value operation timed out: {0}")]
    Timeout(String),
}
