//! The outcome of a single handler invocation.

/// Error kind reported when a handler invocation fails.
pub const ERROR_KIND_HANDLER: &str = "handler_error";

/// The result of dispatching an alert to a handler.
///
/// Never persisted; consumed immediately by the worker to decide between
/// acknowledgment, retry and dead-lettering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// Whether the handler produced a notification message.
    pub success: bool,

    /// The human-readable message produced on success.
    pub message: Option<String>,

    /// A short classification of the failure, if any.
    pub error_kind: Option<String>,
}

impl DispatchResult {
    /// A successful dispatch carrying the rendered message.
    pub fn delivered(message: String) -> Self {
        Self { success: true, message: Some(message), error_kind: None }
    }

    /// A failed dispatch with the given error kind.
    pub fn failed(error_kind: &str) -> Self {
        Self { success: false, message: None, error_kind: Some(error_kind.to_string()) }
    }
}
