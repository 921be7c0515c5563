//! Durable queue topology and publishing.
//!
//! Three durable queues hang off one direct exchange: *incoming* is consumed
//! by workers and dead-letters rejections into the DLQ; *retry* holds delayed
//! re-deliveries and dead-letters them back into *incoming* when their TTL
//! elapses; *dead-letter* is terminal. Delayed re-delivery therefore needs no
//! timer task; the broker does the clock-keeping.

pub mod error;
mod publisher;
mod traits;

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, ShortString},
    Channel, ExchangeKind,
};

pub use error::QueueError;
pub use publisher::QueuePublisher;
pub use traits::AlertPublisher;
#[cfg(test)]
pub use traits::MockAlertPublisher;

use crate::config::{QueueConfig, RetryConfig};

/// Message header carrying the envelope's retry count.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Declares the exchange, the three queues and their bindings.
///
/// Idempotent: redeclaring existing durable entities with identical arguments
/// is a no-op on the broker.
pub async fn declare_topology(
    channel: &Channel,
    config: &QueueConfig,
    retry: &RetryConfig,
) -> Result<(), QueueError> {
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    // Rejections from incoming go straight to the DLQ.
    let mut incoming_args = FieldTable::default();
    incoming_args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(config.exchange.clone().into()),
    );
    incoming_args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(config.dead_letter_queue.clone().into()),
    );
    declare_and_bind(channel, config, &config.incoming_queue, incoming_args).await?;

    // Retry messages fall back into incoming once their TTL elapses. The
    // queue-level TTL is the cap; per-message expirations shorten it.
    let mut retry_args = FieldTable::default();
    retry_args.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongInt(duration_to_ms(retry.max_delay_ms)),
    );
    retry_args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(config.exchange.clone().into()),
    );
    retry_args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(config.incoming_queue.clone().into()),
    );
    declare_and_bind(channel, config, &config.retry_queue, retry_args).await?;

    declare_and_bind(channel, config, &config.dead_letter_queue, FieldTable::default()).await?;

    Ok(())
}

async fn declare_and_bind(
    channel: &Channel,
    config: &QueueConfig,
    queue: &str,
    args: FieldTable,
) -> Result<(), QueueError> {
    channel
        .queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, args)
        .await?;
    channel
        .queue_bind(
            queue,
            &config.exchange,
            queue,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Reads the retry count from a delivery's headers, defaulting to zero.
pub fn retry_count_from_headers(headers: Option<&FieldTable>) -> u32 {
    headers
        .and_then(|table| {
            table.inner().iter().find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
        })
        .and_then(|(_, value)| match value {
            AMQPValue::LongInt(v) => Some(*v as u32),
            AMQPValue::LongLongInt(v) => Some(*v as u32),
            AMQPValue::ShortInt(v) => Some(*v as u32),
            AMQPValue::ShortShortInt(v) => Some(*v as u32),
            _ => None,
        })
        .unwrap_or(0)
}

fn duration_to_ms(d: std::time::Duration) -> i32 {
    d.as_millis().min(i32::MAX as u128) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_headers_default_to_zero_retries() {
        assert_eq!(retry_count_from_headers(None), 0);
        assert_eq!(retry_count_from_headers(Some(&FieldTable::default())), 0);
    }

    #[test]
    fn reads_retry_count_header() {
        let mut headers = FieldTable::default();
        headers.insert(ShortString::from(RETRY_COUNT_HEADER), AMQPValue::LongInt(2));

        assert_eq!(retry_count_from_headers(Some(&headers)), 2);
    }

    #[test]
    fn ignores_non_numeric_retry_header() {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRY_COUNT_HEADER),
            AMQPValue::LongString("two".into()),
        );

        assert_eq!(retry_count_from_headers(Some(&headers)), 0);
    }
}
