use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};

use crate::{
    config::{QueueConfig, RetryConfig},
    models::alert::AlertEvent,
    queue::{error::QueueError, traits::AlertPublisher, RETRY_COUNT_HEADER},
};

/// Persistent delivery mode per the AMQP basic class.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Bound on a single publish round-trip including the broker confirmation.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// A broker-backed alert publisher with publisher confirms enabled.
pub struct QueuePublisher {
    channel: Channel,
    config: QueueConfig,
    retry: RetryConfig,
}

impl QueuePublisher {
    /// Opens a channel on `connection` with publisher confirms enabled.
    pub async fn new(
        connection: &Connection,
        config: QueueConfig,
        retry: RetryConfig,
    ) -> Result<Self, QueueError> {
        let channel = connection.create_channel().await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;
        Ok(Self { channel, config, retry })
    }

    /// Connects to the broker at `uri`.
    pub async fn connect(uri: &str) -> Result<Connection, QueueError> {
        Ok(Connection::connect(uri, ConnectionProperties::default()).await?)
    }

    /// Computes the re-delivery delay for a retry count: exponential in the
    /// count, capped at the configured maximum.
    pub fn retry_delay(retry: &RetryConfig, retry_count: u32) -> Duration {
        let factor = 1u64 << retry_count.min(16);
        let delay_ms = (retry.base_delay_ms.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(retry.max_delay_ms)
    }

    async fn publish_message(
        &self,
        routing_key: &str,
        alert: &AlertEvent,
        retry_count: u32,
        expiration_ms: Option<u64>,
    ) -> Result<(), QueueError> {
        let body = serde_json::to_vec(alert)?;

        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRY_COUNT_HEADER),
            AMQPValue::LongInt(retry_count.min(i32::MAX as u32) as i32),
        );

        let mut properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type(ShortString::from("application/json"))
            .with_headers(headers);
        if let Some(ms) = expiration_ms {
            properties = properties.with_expiration(ShortString::from(ms.to_string()));
        }

        let publish = async {
            self.channel
                .basic_publish(
                    &self.config.exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &body,
                    properties,
                )
                .await? // wait for the publish
                .await // wait for the broker's confirmation
                .map_err(QueueError::from)
        };
        let confirmation = tokio::time::timeout(PUBLISH_TIMEOUT, publish)
            .await
            .map_err(|_| QueueError::PublishTimeout(routing_key.to_string()))??;

        if matches!(confirmation, Confirmation::Nack(_)) {
            return Err(QueueError::PublishNacked(routing_key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertPublisher for QueuePublisher {
    async fn publish(&self, alert: &AlertEvent) -> Result<(), QueueError> {
        self.publish_message(&self.config.incoming_queue, alert, 0, None).await
    }

    async fn publish_retry(&self, alert: &AlertEvent, retry_count: u32) -> Result<(), QueueError> {
        let delay = Self::retry_delay(&self.retry, retry_count);
        tracing::debug!(
            retry_count,
            delay_ms = delay.as_millis() as u64,
            "Publishing retry copy to delay queue."
        );
        self.publish_message(
            &self.config.retry_queue,
            alert,
            retry_count,
            Some(delay.as_millis() as u64),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_is_non_decreasing_and_capped() {
        let retry = RetryConfig {
            base_delay_ms: Duration::from_millis(5_000),
            max_delay_ms: Duration::from_millis(60_000),
            ..Default::default()
        };

        let delays: Vec<Duration> =
            (0..8).map(|count| QueuePublisher::retry_delay(&retry, count)).collect();

        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0], "delays must be non-decreasing: {:?}", delays);
        }
        assert_eq!(delays[0], Duration::from_millis(5_000));
        assert_eq!(delays[1], Duration::from_millis(10_000));
        assert_eq!(delays[7], Duration::from_millis(60_000));
    }

    #[test]
    fn retry_delay_survives_large_counts() {
        let retry = RetryConfig::default();
        assert_eq!(
            QueuePublisher::retry_delay(&retry, u32::MAX),
            retry.max_delay_ms
        );
    }
}
