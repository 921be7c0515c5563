use async_trait::async_trait;

use crate::{
    handlers::{error::HandlerError, Handler, HandlerContext},
    models::alert::{LABEL_ALERT_NAME, UNKNOWN},
};

/// The built-in handler substituted for unresolvable names.
///
/// Echoes the alert's identity and payload keys so the notification still
/// carries enough context to act on, without failing the pipeline.
pub struct FallbackHandler;

#[async_trait]
impl Handler for FallbackHandler {
    async fn handle(&self, ctx: &HandlerContext) -> Result<String, HandlerError> {
        let name = ctx.labels.get(LABEL_ALERT_NAME).map(String::as_str).unwrap_or(UNKNOWN);
        let keys: Vec<&str> = ctx.payload.keys().map(String::as_str).collect();
        Ok(format!(
            "Alert '{}' on '{}' handled by fallback (payload keys: {})",
            name,
            ctx.target,
            keys.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::test_helpers::AlertBuilder;

    #[tokio::test]
    async fn echoes_identity_and_payload_keys() {
        let alert = AlertBuilder::new("DiskFull").instance("h1").build();
        let payload = BTreeMap::from([
            ("mount".to_string(), "/var".to_string()),
            ("severity".to_string(), "critical".to_string()),
        ]);
        let ctx = HandlerContext::new(&alert, payload);

        let message = FallbackHandler.handle(&ctx).await.unwrap();

        assert_eq!(
            message,
            "Alert 'DiskFull' on 'h1' handled by fallback (payload keys: mount, severity)"
        );
    }
}
