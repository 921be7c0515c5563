//! The consumption loop: dequeue, route, dispatch, and decide retry versus
//! dead-letter on failure.
//!
//! Acknowledgment discipline: a delivery is acknowledged only after its
//! outcome is durably recorded — successful handling, explicit suppression,
//! or a confirmed republish to the retry queue. Rejections are routed to the
//! dead-letter queue by the incoming queue's dead-letter configuration.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    Consumer,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    fingerprint::fingerprint,
    handlers::Dispatcher,
    models::{alert::AlertEvent, envelope::QueueEnvelope},
    notification::Notifier,
    queue::{retry_count_from_headers, AlertPublisher, QueuePublisher},
    router::RouteManager,
    throttle::ThrottleStore,
};

/// The terminal or continuing state a single delivery reaches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// An equivalent alert was delivered within the suppression window.
    Suppressed,
    /// The alert's name has no configured route; not retried.
    RouteMissing,
    /// The handler produced a message and the fingerprint was marked.
    Delivered,
    /// The attempt failed; a retry copy should be published with this count
    /// and delay.
    Retry {
        /// The incremented retry count for the republished copy.
        retry_count: u32,
        /// The re-delivery delay for the republished copy.
        delay: Duration,
    },
    /// Retries are exhausted; the delivery belongs in the dead-letter queue.
    Exhausted,
}

/// A single consumer against the incoming queue.
pub struct Worker {
    config: Arc<AppConfig>,
    throttle: Arc<ThrottleStore>,
    routes: Arc<RouteManager>,
    dispatcher: Arc<Dispatcher>,
    publisher: Arc<dyn AlertPublisher>,
    notifier: Arc<dyn Notifier>,
    cancellation_token: CancellationToken,
}

impl Worker {
    /// Creates a new Worker instance.
    pub fn new(
        config: Arc<AppConfig>,
        throttle: Arc<ThrottleStore>,
        routes: Arc<RouteManager>,
        dispatcher: Arc<Dispatcher>,
        publisher: Arc<dyn AlertPublisher>,
        notifier: Arc<dyn Notifier>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { config, throttle, routes, dispatcher, publisher, notifier, cancellation_token }
    }

    /// Runs the consumption loop until cancelled.
    ///
    /// Cancellation stops accepting new deliveries but lets the in-flight
    /// message finish its attempt; unacknowledged messages are redelivered to
    /// another consumer or a future process start.
    pub async fn run(self, mut consumer: Consumer) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Worker cancellation signal received, draining...");
                    break;
                }

                maybe_delivery = consumer.next() => {
                    match maybe_delivery {
                        Some(Ok(delivery)) => self.handle_delivery(delivery).await,
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Consumer stream error.");
                        }
                        None => {
                            tracing::warn!("Consumer stream closed by broker.");
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!("Worker has shut down.");
    }

    /// Decodes one delivery, runs the state machine and applies the
    /// acknowledgment discipline for its outcome.
    async fn handle_delivery(&self, delivery: Delivery) {
        let alert: AlertEvent = match serde_json::from_slice(&delivery.data) {
            Ok(alert) => alert,
            Err(e) => {
                // An undecodable body can never succeed; reject straight to
                // the dead-letter queue.
                tracing::error!(error = %e, "Failed to decode alert body, dead-lettering.");
                self.nack(&delivery, false).await;
                return;
            }
        };
        let retry_count = retry_count_from_headers(delivery.properties.headers().as_ref());
        let envelope = QueueEnvelope { alert, retry_count };

        match self.process(&envelope).await {
            ProcessOutcome::Suppressed
            | ProcessOutcome::RouteMissing
            | ProcessOutcome::Delivered => {
                self.ack(&delivery).await;
            }
            ProcessOutcome::Retry { retry_count, .. } => {
                match self.publisher.publish_retry(&envelope.alert, retry_count).await {
                    Ok(()) => self.ack(&delivery).await,
                    Err(e) => {
                        // The retry copy is not durable yet; requeue the
                        // original instead of acknowledging it away.
                        tracing::error!(error = %e, "Failed to publish retry copy, requeueing original.");
                        self.nack(&delivery, true).await;
                    }
                }
            }
            ProcessOutcome::Exhausted => {
                tracing::warn!(
                    alert = envelope.alert.name().unwrap_or(crate::models::alert::UNKNOWN),
                    retry_count = envelope.retry_count,
                    "Retries exhausted, dead-lettering."
                );
                self.nack(&delivery, false).await;
            }
        }
    }

    /// Runs the per-message state machine and returns the reached state.
    ///
    /// Pure with respect to the queue: publishing and acknowledgment are the
    /// caller's concern.
    pub async fn process(&self, envelope: &QueueEnvelope) -> ProcessOutcome {
        let alert = &envelope.alert;
        let key = fingerprint(alert);
        let window = self.config.suppression_window_secs;

        if self.throttle.suppressed(&key, window).await {
            tracing::debug!(fingerprint = %key, "Alert suppressed within window.");
            return ProcessOutcome::Suppressed;
        }

        let Some(route) = self.routes.resolve(alert) else {
            tracing::warn!(
                alert = alert.name().unwrap_or(crate::models::alert::UNKNOWN),
                "No route configured for alert, acknowledging without dispatch."
            );
            return ProcessOutcome::RouteMissing;
        };

        let result = self.dispatcher.dispatch(&route.handler, alert, route.payload).await;

        if result.success {
            self.throttle.mark(&key, window).await;
            if let Some(message) = &result.message {
                if let Err(e) = self.notifier.notify(alert, message).await {
                    tracing::error!(error = %e, "Notification hand-off failed.");
                }
            }
            return ProcessOutcome::Delivered;
        }

        let next_count = envelope.retry_count + 1;
        if next_count < self.config.retry.max_retries {
            ProcessOutcome::Retry {
                retry_count: next_count,
                delay: QueuePublisher::retry_delay(&self.config.retry, next_count),
            }
        } else {
            ProcessOutcome::Exhausted
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
            tracing::error!(error = %e, "Failed to acknowledge delivery.");
        }
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) {
        let options = BasicNackOptions { requeue, ..Default::default() };
        if let Err(e) = delivery.acker.nack(options).await {
            tracing::error!(error = %e, "Failed to reject delivery.");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        handlers::{Handler, HandlerContext, HandlerError, HandlerRegistry},
        models::route::{RouteRule, RouteSet},
        test_helpers::{test_config, AlertBuilder, RecordingNotifier, RecordingPublisher},
    };

    /// Counts invocations; always fails when `fail` is set.
    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, ctx: &HandlerContext) -> Result<String, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(HandlerError::Execution("always fails".to_string()))
            } else {
                Ok(format!("handled {}", ctx.target))
            }
        }
    }

    struct Fixture {
        worker: Worker,
        calls: Arc<AtomicUsize>,
        notifier: Arc<RecordingNotifier>,
        throttle: Arc<ThrottleStore>,
    }

    fn fixture(handler_fails: bool) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler_calls = calls.clone();
        let mut registry = HandlerRegistry::new();
        registry.register("counting", move || {
            Ok(Arc::new(CountingHandler { calls: handler_calls.clone(), fail: handler_fails }))
        });

        let mut set = RouteSet::default();
        set.routes.insert(
            "DiskFull".to_string(),
            RouteRule { handler: "counting".to_string(), payload: BTreeMap::new() },
        );

        let notifier = Arc::new(RecordingNotifier::default());
        let throttle = Arc::new(ThrottleStore::new(None));
        let worker = Worker::new(
            Arc::new(test_config()),
            throttle.clone(),
            Arc::new(RouteManager::new(set)),
            Arc::new(Dispatcher::new(registry)),
            Arc::new(RecordingPublisher::default()),
            notifier.clone(),
            CancellationToken::new(),
        );

        Fixture { worker, calls, notifier, throttle }
    }

    #[tokio::test]
    async fn fresh_alert_is_delivered_and_marked() {
        let fx = fixture(false);
        let alert = AlertBuilder::new("DiskFull").instance("h1").label("job", "node").build();

        let outcome = fx.worker.process(&QueueEnvelope::new(alert.clone())).await;

        assert_eq!(outcome, ProcessOutcome::Delivered);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            fx.notifier.messages.lock().unwrap().as_slice(),
            &[("DiskFull".to_string(), "handled h1".to_string())]
        );
        let key = fingerprint(&alert);
        assert!(fx.throttle.suppressed(&key, Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn equivalent_alert_is_suppressed_without_dispatch() {
        let fx = fixture(false);
        let first = AlertBuilder::new("DiskFull").instance("h1").label("job", "node").build();
        let duplicate = AlertBuilder::new("DiskFull")
            .instance("h1")
            .label("job", "node")
            .annotation("summary", "still full")
            .build();

        assert_eq!(fx.worker.process(&QueueEnvelope::new(first.clone())).await, ProcessOutcome::Delivered);
        assert_eq!(fx.worker.process(&QueueEnvelope::new(duplicate.clone())).await, ProcessOutcome::Suppressed);

        // The handler ran exactly once; the duplicate never dispatched.
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn route_miss_short_circuits_without_dispatch() {
        let fx = fixture(false);
        let alert = AlertBuilder::new("NoSuchAlert").instance("h1").build();

        let outcome = fx.worker.process(&QueueEnvelope::new(alert.clone())).await;

        assert_eq!(outcome, ProcessOutcome::RouteMissing);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        // Routing gaps are not marked as delivered.
        let key = fingerprint(&alert);
        assert!(!fx.throttle.suppressed(&key, Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn failing_handler_walks_retry_then_exhaustion() {
        let fx = fixture(true);
        let alert = AlertBuilder::new("DiskFull").instance("h1").build();

        // max_retries = 3: counts 1 and 2 retry, count 3 exhausts.
        let first = fx.worker.process(&QueueEnvelope::new(alert.clone())).await;
        let second = fx.worker.process(&QueueEnvelope { alert: alert.clone(), retry_count: 1 }).await;
        let third = fx.worker.process(&QueueEnvelope { alert: alert.clone(), retry_count: 2 }).await;

        let ProcessOutcome::Retry { retry_count: c1, delay: d1 } = first else {
            panic!("expected retry, got {first:?}");
        };
        let ProcessOutcome::Retry { retry_count: c2, delay: d2 } = second else {
            panic!("expected retry, got {second:?}");
        };
        assert_eq!((c1, c2), (1, 2));
        assert!(d2 >= d1, "retry delays must be non-decreasing");
        assert_eq!(third, ProcessOutcome::Exhausted);

        // Failures never mark the fingerprint.
        let key = fingerprint(&alert);
        assert!(!fx.throttle.suppressed(&key, Duration::from_secs(30)).await);
        assert!(fx.notifier.messages.lock().unwrap().is_empty());
    }
}
