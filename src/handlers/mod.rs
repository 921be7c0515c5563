//! Handler registry and dispatch.
//!
//! Handlers are pluggable units of logic that turn a routed alert into a
//! human-readable message. They are registered under string names; resolution
//! is lazy and cached after the first successful load, and unknown names
//! degrade to a built-in fallback handler so an unexpected alert type can
//! never crash the worker.

pub mod error;
mod fallback;
mod template;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

pub use error::HandlerError;
pub use fallback::FallbackHandler;
pub use template::TemplateHandler;

use crate::models::{
    alert::AlertEvent,
    dispatch::{DispatchResult, ERROR_KIND_HANDLER},
};

/// Everything a handler receives for one invocation.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// The alert's target identity (instance label).
    pub target: String,

    /// The alert's labels.
    pub labels: BTreeMap<String, String>,

    /// The alert's annotations.
    pub annotations: BTreeMap<String, String>,

    /// The enriched payload resolved by the router.
    pub payload: BTreeMap<String, String>,
}

impl HandlerContext {
    /// Builds the invocation context for an alert and its resolved payload.
    pub fn new(alert: &AlertEvent, payload: BTreeMap<String, String>) -> Self {
        Self {
            target: alert.target().to_string(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            payload,
        }
    }
}

/// A pluggable unit of logic invoked for a routed alert.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produces the human-readable notification message for this alert.
    async fn handle(&self, ctx: &HandlerContext) -> Result<String, HandlerError>;
}

/// Builds a handler instance on first resolution.
pub type HandlerFactory = Box<dyn Fn() -> Result<Arc<dyn Handler>, HandlerError> + Send + Sync>;

/// Maps handler names to lazily constructed handler instances.
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
    cache: DashMap<String, Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Creates a registry with the built-in handlers registered.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            cache: DashMap::new(),
            fallback: Arc::new(FallbackHandler),
        };
        registry.register("template", || Ok(Arc::new(TemplateHandler::new())));
        registry
    }

    /// Registers a factory under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Handler>, HandlerError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self.cache.remove(name);
    }

    /// Resolves a handler by name.
    ///
    /// Unknown names and factory failures resolve to the fallback handler so
    /// dispatch always has something to run.
    pub fn resolve(&self, name: &str) -> Arc<dyn Handler> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }

        match self.factories.get(name) {
            Some(factory) => match factory() {
                Ok(handler) => {
                    self.cache.insert(name.to_string(), handler.clone());
                    handler
                }
                Err(e) => {
                    tracing::error!(handler = name, error = %e, "Handler construction failed, using fallback handler.");
                    self.fallback.clone()
                }
            },
            None => {
                tracing::warn!(handler = name, "Handler not registered, using fallback handler.");
                self.fallback.clone()
            }
        }
    }
}

/// Bound on a single handler invocation, including any I/O it performs.
const HANDLER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Invokes handlers and absorbs their failures.
pub struct Dispatcher {
    registry: HandlerRegistry,
}

impl Dispatcher {
    /// Creates a dispatcher over a populated registry.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Dispatches an alert to the named handler.
    ///
    /// Handler failures and timeouts are caught here and converted into a
    /// failed [`DispatchResult`]; no handler error ever reaches the worker's
    /// acknowledgment logic.
    pub async fn dispatch(
        &self,
        handler_name: &str,
        alert: &AlertEvent,
        payload: BTreeMap<String, String>,
    ) -> DispatchResult {
        let handler = self.registry.resolve(handler_name);
        let ctx = HandlerContext::new(alert, payload);

        match tokio::time::timeout(HANDLER_TIMEOUT, handler.handle(&ctx)).await {
            Ok(Ok(message)) => DispatchResult::delivered(message),
            Ok(Err(e)) => {
                tracing::error!(handler = handler_name, error = %e, "Handler invocation failed.");
                DispatchResult::failed(ERROR_KIND_HANDLER)
            }
            Err(_) => {
                tracing::error!(handler = handler_name, "Handler invocation timed out.");
                DispatchResult::failed(ERROR_KIND_HANDLER)
            }
        }
    }
}
