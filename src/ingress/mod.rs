//! The ingress HTTP server.
//!
//! Accepts pre-translated alert batches, deduplicates against the throttle
//! store and enqueues durably. Handler logic never runs here; the response
//! only reports how many alerts were queued.

mod error;

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub use error::ApiError;

use crate::{
    config::AppConfig,
    fingerprint::fingerprint,
    models::{
        alert::{AlertBatch, AlertEvent},
        route::RouteSet,
    },
    queue::AlertPublisher,
    router::RouteManager,
    throttle::ThrottleStore,
};

/// Shared state for the ingress handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Shared application configuration.
    pub config: Arc<AppConfig>,

    /// The throttle store consulted before enqueueing.
    pub throttle: Arc<ThrottleStore>,

    /// The publisher used to enqueue accepted alerts.
    pub publisher: Arc<dyn AlertPublisher>,

    /// The route manager, replaceable at runtime.
    pub routes: Arc<RouteManager>,
}

/// Builds the ingress router over the given state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/alert", post(ingest_alerts))
        .route("/health", get(health))
        .route("/throttle/stats", get(throttle_stats))
        .route("/routes", put(update_routes))
        .with_state(state)
}

/// Runs the ingress server until the cancellation token fires.
pub async fn run_server(
    state: ApiState,
    cancellation_token: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = state.config.listen_address.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(listen_address = %addr, "Ingress HTTP server listening.");

    let app = build_router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Accepts a batch of alerts and enqueues the ones not currently suppressed.
///
/// Always answers 200: per-alert failures are logged and reflected in the
/// `ok`/`queued` fields, never as a different status code, and one alert's
/// failure never aborts its siblings.
async fn ingest_alerts(
    State(state): State<ApiState>,
    Json(batch): Json<AlertBatch>,
) -> impl IntoResponse {
    let total = batch.alerts.len();
    let mut queued = 0usize;
    let mut failed = 0usize;

    for alert in &batch.alerts {
        let key = fingerprint(alert);
        if state.throttle.suppressed(&key, state.config.suppression_window_secs).await {
            tracing::debug!(fingerprint = %key, "Alert suppressed at ingress, not enqueued.");
            continue;
        }

        match publish_with_backoff(&state, alert).await {
            Ok(()) => queued += 1,
            Err(e) => {
                failed += 1;
                tracing::error!(
                    alert = alert.name().unwrap_or(crate::models::alert::UNKNOWN),
                    error = %e,
                    "Failed to enqueue alert after retries."
                );
            }
        }
    }

    tracing::info!(total, queued, failed, "Alert batch processed.");
    Json(json!({ "ok": failed == 0, "queued": queued }))
}

/// Publishes with bounded exponential backoff.
///
/// An alert that cannot be durably queued must not be silently dropped, so
/// every attempt is made before the failure is reported to the caller.
async fn publish_with_backoff(
    state: &ApiState,
    alert: &AlertEvent,
) -> Result<(), crate::queue::QueueError> {
    let retry = &state.config.retry;
    let attempts = retry.publish_attempts.max(1);
    let mut backoff = retry.publish_backoff_ms;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match state.publisher.publish(alert).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Publish attempt failed, backing off.");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}

async fn throttle_stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::to_value(state.throttle.stats()).unwrap_or_else(|_| json!({})))
}

/// Replaces the route and override tables at runtime.
async fn update_routes(
    State(state): State<ApiState>,
    Json(set): Json<RouteSet>,
) -> Result<impl IntoResponse, ApiError> {
    let routes = set.routes.len();
    state.routes.update(set);
    Ok(Json(json!({ "status": "Routes updated", "routes": routes })))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        queue::{MockAlertPublisher, QueueError},
        test_helpers::{test_config, AlertBuilder},
    };

    fn state_with(publisher: MockAlertPublisher) -> ApiState {
        ApiState {
            config: Arc::new(test_config()),
            throttle: Arc::new(ThrottleStore::new(None)),
            publisher: Arc::new(publisher),
            routes: Arc::new(RouteManager::new(RouteSet::default())),
        }
    }

    fn alert_batch_body(alerts: Vec<crate::models::alert::AlertEvent>) -> Body {
        Body::from(serde_json::to_vec(&AlertBatch { alerts }).unwrap())
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_answers_ok() {
        let app = build_router(state_with(MockAlertPublisher::new()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn batch_is_queued_and_counted() {
        let mut publisher = MockAlertPublisher::new();
        publisher.expect_publish().times(2).returning(|_| Ok(()));
        let app = build_router(state_with(publisher));

        let alerts = vec![
            AlertBuilder::new("DiskFull").instance("h1").build(),
            AlertBuilder::new("CpuHigh").instance("h2").build(),
        ];
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/alert")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(alert_batch_body(alerts))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, json!({ "ok": true, "queued": 2 }));
    }

    #[tokio::test]
    async fn publish_failure_is_reported_not_fatal() {
        let mut publisher = MockAlertPublisher::new();
        // One alert fails every attempt, the sibling still queues.
        publisher.expect_publish().returning(|alert| {
            if alert.name() == Some("DiskFull") {
                Err(QueueError::PublishNacked("vigil.incoming".to_string()))
            } else {
                Ok(())
            }
        });
        let app = build_router(state_with(publisher));

        let alerts = vec![
            AlertBuilder::new("DiskFull").instance("h1").build(),
            AlertBuilder::new("CpuHigh").instance("h2").build(),
        ];
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/alert")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(alert_batch_body(alerts))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, json!({ "ok": false, "queued": 1 }));
    }

    #[tokio::test]
    async fn suppressed_alert_is_not_enqueued() {
        let publisher = MockAlertPublisher::new(); // no publish expected
        let state = state_with(publisher);
        let alert = AlertBuilder::new("DiskFull").instance("h1").build();
        state.throttle.mark(&fingerprint(&alert), Duration::from_secs(30)).await;
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/alert")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(alert_batch_body(vec![alert]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response_json(response).await, json!({ "ok": true, "queued": 0 }));
    }

    #[tokio::test]
    async fn publish_retries_with_backoff_before_reporting_failure() {
        let mut publisher = MockAlertPublisher::new();
        let mut attempts = 0u32;
        publisher.expect_publish().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(QueueError::PublishNacked("vigil.incoming".to_string()))
            } else {
                Ok(())
            }
        });
        let app = build_router(state_with(publisher));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/alert")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(alert_batch_body(vec![AlertBuilder::new("DiskFull")
                        .instance("h1")
                        .build()]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response_json(response).await, json!({ "ok": true, "queued": 1 }));
    }

    #[tokio::test]
    async fn throttle_stats_exposes_backend_state() {
        let app = build_router(state_with(MockAlertPublisher::new()));

        let response = app
            .oneshot(Request::builder().uri("/throttle/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = response_json(response).await;
        assert_eq!(body.get("backend").unwrap(), "fallback");
        assert_eq!(body.get("count").unwrap(), 0);
    }

    #[tokio::test]
    async fn routes_can_be_replaced_at_runtime() {
        let state = state_with(MockAlertPublisher::new());
        let routes = state.routes.clone();
        let app = build_router(state);

        let new_set = json!({
            "routes": { "DiskFull": { "handler": "template", "payload": {} } }
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/routes")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(new_set.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(routes.route_count(), 1);
    }
}
