//! Drowsiness Monitor Server
//!
//! Wires the capture, detection, alerting and streaming crates into one
//! process and exposes them over HTTP for the dashboard.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use camera_capture::{CaptureStatus, FrameBuffer, StopFlag};
use dms::{MonitorShared, SharedClassifier};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use video_stream::StreamRenderer;

pub mod config;
mod error;
pub mod pipeline;
mod routes;

#[cfg(test)]
mod testing;

pub use crate::config::{AppConfig, ConfigError};
pub use error::ApiError;
pub use pipeline::Pipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<MonitorShared>,
    pub classifier: SharedClassifier,
    pub buffer: Arc<FrameBuffer>,
    pub renderer: StreamRenderer,
    /// Ends live video streams on shutdown
    pub stop: StopFlag,
    pub camera: Option<CaptureStatus>,
    pub alert_hardware: bool,
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create application state over a running pipeline
    pub fn new(pipeline: &Pipeline, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            shared: pipeline.shared.clone(),
            classifier: pipeline.classifier.clone(),
            buffer: pipeline.buffer.clone(),
            renderer: pipeline.renderer.clone(),
            stop: pipeline.stop_flag(),
            camera: Some(pipeline.camera()),
            alert_hardware: pipeline.has_alert_hardware(),
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/health", get(routes::status::health))
        .route("/api/v1/stats/reset", post(routes::control::reset_stats))
        .route(
            "/api/v1/settings",
            get(routes::control::get_settings).put(routes::control::put_settings),
        )
        .route("/api/v1/predict", post(routes::control::predict))
        .route("/api/v1/frame.jpg", get(routes::video::snapshot))
        .route("/video_feed", get(routes::video::video_feed))
        .route("/metrics", get(routes::status::metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(config: &crate::config::LoggingConfig) -> Result<(), ApiError> {
    let level = Level::from_str(&config.level).map_err(|e| ApiError::Logging(e.to_string()))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Metrics disabled: {}", e);
            None
        }
    }
}

/// Run the server until ctrl-c, then shut the pipeline down
pub async fn run_server(config: AppConfig) -> Result<(), ApiError> {
    let metrics = init_metrics();
    let listener = tokio::net::TcpListener::bind(config.server.bind.as_str()).await?;

    let mut pipeline = tokio::task::spawn_blocking({
        let config = config.clone();
        move || Pipeline::start(&config)
    })
    .await??;

    let app = create_router(AppState::new(&pipeline, metrics));
    let stop = pipeline.stop_flag();

    info!("Starting API server on {}", config.server.bind);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            // Ends open video streams so graceful shutdown can finish
            stop.stop();
        })
        .await;

    tokio::task::spawn_blocking(move || pipeline.shutdown()).await?;
    served?;
    Ok(())
}
