//! PlantCare Classifier API Server
//!
//! REST API exposing the leaf disease classifier: upload a photograph to
//! `/predict` and get back the predicted class and its confidence.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use inference_engine::Classifier;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod config;
mod error;
pub mod routes;

pub use crate::config::{LogConfig, ServerConfig};
pub use crate::error::{ApiError, ErrorBody};

/// Application state shared across handlers
pub struct AppState {
    /// Loaded classifier, read-only after startup
    pub classifier: Arc<Classifier>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus handle when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(classifier: Arc<Classifier>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            classifier,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Create the application router
///
/// `max_upload_bytes` of `None` lifts axum's default request body limit so
/// full-resolution photographs are accepted.
pub fn create_router(state: Arc<AppState>, max_upload_bytes: Option<usize>) -> Router {
    let body_limit = match max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict", post(routes::predict::predict))
        .route("/health", get(routes::health::health_check))
        .route("/labels", get(routes::labels::get_labels))
        .route("/metrics", get(routes::metrics::render))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(body_limit),
        )
}

/// Initialize logging
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Run the server until Ctrl-C
pub async fn run_server(
    config: &ServerConfig,
    classifier: Classifier,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let metrics = if config.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    let state = Arc::new(AppState::new(Arc::new(classifier), metrics));
    let app = create_router(state, config.max_upload_bytes);

    let addr = config.bind_addr();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
