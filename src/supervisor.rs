//! The Supervisor manages the lifecycle of the Vigil application.
//!
//! It owns the ingress server and the worker, starts them as supervised
//! tasks, listens for shutdown signals (Ctrl+C or SIGTERM) and orchestrates a
//! graceful drain: the worker stops accepting new deliveries, in-flight
//! attempts finish, and the broker connection closes last so unacknowledged
//! messages become redeliverable.

use std::sync::Arc;

use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Connection,
};
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    handlers::Dispatcher,
    ingress::{self, ApiState},
    notification::Notifier,
    queue::{AlertPublisher, QueueError, QueuePublisher},
    router::RouteManager,
    throttle::ThrottleStore,
    worker::Worker,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// An error occurred while talking to the broker.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// An error occurred in the AMQP client.
    #[error("AMQP error: {0}")]
    Lapin(#[from] lapin::Error),
}

/// The primary runtime manager for the application.
pub struct Supervisor {
    config: Arc<AppConfig>,
    connection: Connection,
    publisher: Arc<QueuePublisher>,
    throttle: Arc<ThrottleStore>,
    routes: Arc<RouteManager>,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<dyn Notifier>,
    cancellation_token: CancellationToken,
    join_set: tokio::task::JoinSet<()>,
}

impl Supervisor {
    /// Creates a new Supervisor instance with all its required components.
    pub fn new(
        config: AppConfig,
        connection: Connection,
        publisher: Arc<QueuePublisher>,
        throttle: Arc<ThrottleStore>,
        routes: Arc<RouteManager>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connection,
            publisher,
            throttle,
            routes,
            dispatcher,
            notifier,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        }
    }

    /// Starts the supervisor and all its managed services, blocking until
    /// shutdown completes.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        // Spawn a task to listen for shutdown signals.
        let cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler")
                    .recv()
                    .await;
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
            }

            cancellation_token.cancel();
        });

        // Spawn the ingress HTTP server.
        let api_state = ApiState {
            config: Arc::clone(&self.config),
            throttle: Arc::clone(&self.throttle),
            publisher: self.publisher.clone() as Arc<dyn AlertPublisher>,
            routes: Arc::clone(&self.routes),
        };
        let http_cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            if let Err(e) = ingress::run_server(api_state, http_cancellation_token).await {
                tracing::error!(error = %e, "Ingress server terminated with error.");
            }
        });

        // Create the bounded consumer and spawn the worker.
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(self.config.queue.prefetch, BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                &self.config.queue.incoming_queue,
                "vigil-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let worker = Worker::new(
            Arc::clone(&self.config),
            Arc::clone(&self.throttle),
            Arc::clone(&self.routes),
            Arc::clone(&self.dispatcher),
            self.publisher.clone() as Arc<dyn AlertPublisher>,
            Arc::clone(&self.notifier),
            self.cancellation_token.clone(),
        );
        self.join_set.spawn(async move {
            worker.run(consumer).await;
        });

        tracing::info!("Supervisor started, all services running.");

        // Monitor task health and the shutdown signal.
        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(_)) => {
                            // Task completed, keep monitoring the rest.
                        }
                        Some(Err(e)) => {
                            tracing::error!("A critical task failed: {:?}. Initiating shutdown.", e);
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => {
                    break;
                }
            }
        }

        // Graceful shutdown: wait for tasks, then close the broker
        // connection within the configured timeout.
        self.join_set.shutdown().await;
        tracing::info!("All supervised tasks have completed.");

        let cleanup = async {
            if let Err(e) = self.connection.close(200, "shutdown").await {
                tracing::warn!(error = %e, "Broker connection close reported an error.");
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, cleanup).await.is_err() {
            tracing::warn!(
                "Cleanup did not complete within {:?}. Continuing shutdown.",
                self.config.shutdown_timeout
            );
        }

        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}
