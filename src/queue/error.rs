//! Error types for queue publishing and topology.

use thiserror::Error;

/// Errors that can occur while declaring topology or publishing.
#[derive(Debug, Error)]
pub enum QueueError {
    /// An error returned by the AMQP client.
    #[error("AMQP error: {0}")]
    Lapin(#[from] lapin::Error),

    /// The broker negatively acknowledged a publish.
    #[error("Broker rejected publish for routing key '{0}'")]
    PublishNacked(String),

    /// The broker did not confirm a publish within the bound.
    #[error("Publish confirmation timed out for routing key '{0}'")]
    PublishTimeout(String),

    /// Failed to serialize an alert for the wire.
    #[error("Failed to serialize alert: {0}")]
    Serialization(#[from] serde_json::Error),
}
