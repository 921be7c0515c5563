//! The boundary to the outbound notification transport.
//!
//! Delivering the rendered message to a chat or mail backend is an external
//! collaborator's job; the pipeline only hands the message across this trait.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::alert::AlertEvent;

/// Errors that can occur while handing off a notification.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The transport rejected or failed to deliver the message.
    #[error("Notification transport failed: {0}")]
    Transport(String),
}

/// Receives the human-readable message produced for a delivered alert.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hands a rendered message to the notification transport.
    async fn notify(&self, alert: &AlertEvent, message: &str) -> Result<(), NotifierError>;
}

/// A notifier that emits messages to the structured log.
///
/// Useful on its own in development and as the default wiring until a real
/// transport collaborator is attached.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &AlertEvent, message: &str) -> Result<(), NotifierError> {
        tracing::info!(
            alert = alert.name().unwrap_or(crate::models::alert::UNKNOWN),
            target = alert.target(),
            message,
            "Alert notification"
        );
        Ok(())
    }
}
