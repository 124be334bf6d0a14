//! Telemetry, health and metrics routes

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dms::StatusSnapshot;
use serde::Serialize;

use crate::AppState;

/// Current drowsiness state with session statistics
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.shared.status())
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub camera: CameraHealth,
    pub model: ModelHealth,
    pub alerts: AlertHealth,
}

#[derive(Debug, Serialize)]
pub struct CameraHealth {
    pub status: String,
    pub source: Option<String>,
    pub frames_published: u64,
    /// Age of the newest frame, `None` before the first one
    pub last_frame_age_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub status: String,
    pub name: String,
    pub classifier_errors: u64,
}

#[derive(Debug, Serialize)]
pub struct AlertHealth {
    pub hardware: bool,
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let camera_running = state.camera.as_ref().is_some_and(|c| c.is_running());
    let model_ready = state.classifier.is_ready();

    let status = if camera_running && model_ready {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            camera: CameraHealth {
                status: if camera_running { "ok" } else { "stopped" }.to_string(),
                source: state.camera.as_ref().map(|c| c.source().to_string()),
                frames_published: state.buffer.published(),
                last_frame_age_ms: state
                    .buffer
                    .try_read()
                    .map(|frame| frame.age().as_millis() as u64),
            },
            model: ModelHealth {
                status: if model_ready { "ok" } else { "not_loaded" }.to_string(),
                name: state.classifier.name().to_string(),
                classifier_errors: state.shared.classifier_errors(),
            },
            alerts: AlertHealth {
                hardware: state.alert_hardware,
            },
        },
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
