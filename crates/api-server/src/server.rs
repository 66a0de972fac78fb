//! API server — wires the engine components into an HTTP surface and a
//! Prometheus metrics listener.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use cadence_core::activity::ActivitySink;
use cadence_core::config::AppConfig;
use cadence_engine::{
    DispatchQueue, EngagementTracker, SequenceScheduler, SequenceStore, StatusAggregator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        store: Arc<SequenceStore>,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        let state = AppState {
            scheduler: Arc::new(SequenceScheduler::new(store.clone(), activity)),
            tracker: Arc::new(EngagementTracker::new(
                store.clone(),
                config.sequence.clone(),
            )),
            dispatch: DispatchQueue::new(store.clone()),
            status: StatusAggregator::new(store),
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Build the router; split out so tests can drive it without binding.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/v1/tenants/:tenant_id/leads/:lead_id/sequence",
                post(rest::start_sequence).get(rest::sequence_status),
            )
            .route("/v1/track/:step_id/open", post(rest::track_open))
            .route("/v1/track/:step_id/click", post(rest::track_click))
            .route("/v1/steps/:step_id/delivery", post(rest::record_delivery))
            .route("/v1/tenants/:tenant_id/due-steps", get(rest::due_steps))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the HTTP REST server (blocks until shutdown).
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
