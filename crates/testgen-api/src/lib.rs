//! Testgen API /v1: REST endpoints over the run registry
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod telemetry;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use testgen_observers::MetricsObserver;
use testgen_runner::RunRegistry;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<RunRegistry>,
    /// Served on `/metrics` when present
    pub metrics: Option<Arc<MetricsObserver>>,
}

impl AppState {
    pub fn new(runs: RunRegistry) -> Self {
        Self {
            runs: Arc::new(runs),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsObserver>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/runs", post(handlers::start_run))
        .route("/v1/runs/{id}", get(handlers::get_run).delete(handlers::cancel_run))
        .route("/v1/runs/{id}/missing", post(handlers::supply_missing))
        .route("/v1/runs/{id}/feedback", post(handlers::supply_feedback))
        .route("/v1/runs/{id}/override", post(handlers::supply_override))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

/// Serve on `addr`, installing the default tracing subscriber unless the
/// embedding application already set one
pub async fn run(addr: &str, state: AppState) -> std::io::Result<()> {
    if let Err(err) = telemetry::init_tracing() {
        tracing::debug!(error = %err, "keeping the existing tracing subscriber");
    }
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("testgen API listening on {}", addr);
    axum::serve(listener, app).await
}
