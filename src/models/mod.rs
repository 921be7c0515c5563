//! Data models for the alert delivery pipeline.

pub mod alert;
pub mod dispatch;
pub mod envelope;
pub mod route;

pub use alert::{AlertBatch, AlertEvent, AlertStatus};
pub use dispatch::DispatchResult;
pub use envelope::QueueEnvelope;
pub use route::{GroupOverride, OverrideTables, ResolvedRoute, RouteRule, RouteSet};
