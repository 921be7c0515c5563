//! Error types for handler execution.

use thiserror::Error;

/// Errors raised by a handler invocation or handler construction.
///
/// These never escape the dispatcher; they are converted into a failed
/// [`DispatchResult`](crate::models::dispatch::DispatchResult) at its
/// boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler could not produce a message.
    #[error("Handler execution failed: {0}")]
    Execution(String),

    /// A notification template failed to render.
    #[error("Template rendering failed: {0}")]
    Template(#[from] minijinja::Error),
}
