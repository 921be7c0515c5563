//! Configuration module for Vigil.

mod app_config;
mod helpers;
mod routes_loader;

pub use app_config::{AppConfig, QueueConfig, RetryConfig};
pub use helpers::{deserialize_duration_from_ms, deserialize_duration_from_seconds};
pub use routes_loader::{RoutesLoader, RoutesLoaderError};
