use async_trait::async_trait;
use minijinja::Environment;
use serde_json::json;

use crate::handlers::{error::HandlerError, Handler, HandlerContext};

/// Payload key holding a rule-specific message template.
const TEMPLATE_KEY: &str = "message_template";

/// Rendered when a route does not supply its own template.
const DEFAULT_TEMPLATE: &str =
    "{{ labels.alertname }} on {{ target }}: {{ annotations.summary }}";

/// The built-in template handler.
///
/// Renders the payload's `message_template` (or a default) against the
/// alert's labels, annotations and payload.
pub struct TemplateHandler {
    env: Environment<'static>,
}

impl Default for TemplateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateHandler {
    /// Creates a handler with a fresh template environment.
    pub fn new() -> Self {
        Self { env: Environment::new() }
    }
}

#[async_trait]
impl Handler for TemplateHandler {
    async fn handle(&self, ctx: &HandlerContext) -> Result<String, HandlerError> {
        let template = ctx
            .payload
            .get(TEMPLATE_KEY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_TEMPLATE);

        let context = json!({
            "target": ctx.target,
            "labels": ctx.labels,
            "annotations": ctx.annotations,
            "payload": ctx.payload,
        });

        Ok(self.env.render_str(template, context)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::test_helpers::AlertBuilder;

    #[tokio::test]
    async fn renders_the_payload_template() {
        let alert = AlertBuilder::new("DiskFull")
            .instance("h1")
            .annotation("summary", "disk is 95% full")
            .build();
        let payload = BTreeMap::from([
            (TEMPLATE_KEY.to_string(), "{{ payload.mount }} full on {{ target }}".to_string()),
            ("mount".to_string(), "/var".to_string()),
        ]);
        let ctx = HandlerContext::new(&alert, payload);

        let message = TemplateHandler::new().handle(&ctx).await.unwrap();

        assert_eq!(message, "/var full on h1");
    }

    #[tokio::test]
    async fn falls_back_to_the_default_template() {
        let alert = AlertBuilder::new("DiskFull")
            .instance("h1")
            .annotation("summary", "disk is 95% full")
            .build();
        let ctx = HandlerContext::new(&alert, BTreeMap::new());

        let message = TemplateHandler::new().handle(&ctx).await.unwrap();

        assert_eq!(message, "DiskFull on h1: disk is 95% full");
    }

    #[tokio::test]
    async fn invalid_template_is_a_handler_error() {
        let alert = AlertBuilder::new("DiskFull").instance("h1").build();
        let payload =
            BTreeMap::from([(TEMPLATE_KEY.to_string(), "{{ unclosed".to_string())]);
        let ctx = HandlerContext::new(&alert, payload);

        let result = TemplateHandler::new().handle(&ctx).await;

        assert!(matches!(result, Err(HandlerError::Template(_))));
    }
}
