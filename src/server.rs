//! HTTP Server and Engine Lifecycle
//!
//! This module runs the engine as a daemon and exposes its state over HTTP.
//!
//! # Architecture
//!
//! - **Engine**: monitor and scheduler loops, started before the listener accepts
//! - **HTTP Server**: Axum-based server exposing `/metrics`, `/health`, and `/` endpoints
//! - **Refresh Loop**: Background task that copies engine state into the gauges
//! - **Event Counter**: Bus subscriber counting events by kind and severity
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to metrics and health
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /health` - 200 if the last monitor tick was healthy, 503 otherwise
//!
//! # Shutdown
//!
//! Ctrl-C (or cancelling the token passed to [`serve`]) stops accepting
//! requests, then stops the monitor and the scheduler and waits for
//! in-flight snapshot runs.

use crate::collectors::{self, CollectionContext};
use crate::config::Config;
use crate::engine::Engine;
use crate::events::{Delivery, EventFilter, Subscription};
use crate::metrics::MetricsCollector;
use crate::store::{MemoryStore, Store};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    metrics: MetricsCollector,
}

/// Builds an engine over an in-memory store and serves until Ctrl-C.
pub async fn start(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::with_notification_capacity(
        config.events.retained_notifications,
    ));
    let engine = Arc::new(Engine::new(&config, store));

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    serve(config, engine, listener, shutdown).await
}

/// Seeds policies, starts `engine` and serves HTTP on `listener` until
/// `shutdown` is cancelled.
pub async fn serve(
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let metrics = MetricsCollector::new()?;

    let seeded = engine.seed_policies(&config.policies).await?;
    if seeded > 0 {
        info!("Seeded {} snapshot policies from configuration", seeded);
    }

    // Subscribe before starting so the first tick's events are counted.
    let subscription = engine.bus().subscribe(EventFilter::all());
    engine.start(&shutdown).await?;

    let counter = tokio::spawn(count_events_loop(
        subscription,
        metrics.clone(),
        shutdown.clone(),
    ));

    let state = AppState {
        engine: Arc::clone(&engine),
        metrics,
    };
    let refresh = tokio::spawn(collect_metrics_loop(
        state.clone(),
        Duration::from_secs(config.server.metrics_refresh_seconds.max(1)),
        shutdown.clone(),
    ));

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    // Whatever ended the server, the loops must not outlive it.
    shutdown.cancel();
    engine.stop().await;
    for task in [counter, refresh] {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }
    info!("Server stopped");

    served?;
    Ok(())
}

async fn collect_metrics_loop(state: AppState, every: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = refresh_metrics(&state.engine, &state.metrics).await {
                    error!("Failed to refresh metrics: {}", e);
                }
            }
        }
    }
}

/// Copies the current engine state into `metrics`.
pub async fn refresh_metrics(engine: &Engine, metrics: &MetricsCollector) -> anyhow::Result<()> {
    let ctx = CollectionContext { engine, metrics };
    collectors::collect_all(&ctx).await?;
    Ok(())
}

async fn count_events_loop(
    mut subscription: Subscription,
    metrics: MetricsCollector,
    shutdown: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            delivery = subscription.recv() => delivery,
        };
        match delivery {
            Some(Delivery::Event(event)) => metrics
                .events_total
                .with_label_values(&[event.kind.as_str(), event.severity.as_str()])
                .inc(),
            Some(Delivery::Overflow { dropped }) => {
                warn!("Event counter fell behind, {} events not counted", dropped);
                metrics.events_dropped_total.inc_by(dropped);
            }
            None => break,
        }
    }
}

async fn root_handler() -> impl IntoResponse {
    r#"<html>
<head><title>NAS Engine</title></head>
<body>
<h1>NAS Monitoring &amp; Scheduling Engine</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.monitor().last_tick_healthy() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Last monitor tick failed")
    }
}
