//! Operator control routes: statistics reset, thresholds, on-demand prediction

use axum::{extract::State, Json};
use dms::{DetectionResult, DetectionSettings, StatusSnapshot};
use serde::Serialize;

use crate::{ApiError, AppState};

/// Zero the session counters; returns the refreshed status
pub async fn reset_stats(State(state): State<AppState>) -> Json<StatusSnapshot> {
    state.shared.reset_statistics();
    Json(state.shared.status())
}

pub async fn get_settings(State(state): State<AppState>) -> Json<DetectionSettings> {
    Json(state.shared.settings())
}

/// Replace the runtime thresholds; invalid values are rejected with 422
pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<DetectionSettings>,
) -> Result<Json<DetectionSettings>, ApiError> {
    state
        .shared
        .update_settings(settings)
        .map_err(|e| ApiError::InvalidSettings(e.to_string()))?;
    Ok(Json(state.shared.settings()))
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: DetectionResult,
    pub threshold: f32,
    pub inference_ms: f64,
    pub frame_sequence: u64,
}

/// Classify the latest frame once without touching the state machine
pub async fn predict(State(state): State<AppState>) -> Result<Json<PredictResponse>, ApiError> {
    let frame = state.buffer.try_read().ok_or(ApiError::NoFrame)?;
    let threshold = state.shared.settings().confidence_threshold;
    let frame_sequence = frame.sequence();
    let classifier = state.classifier.clone();

    let classification =
        tokio::task::spawn_blocking(move || classifier.classify(&frame, threshold)).await??;

    Ok(Json(PredictResponse {
        result: classification.result,
        threshold,
        inference_ms: classification.latency.as_secs_f64() * 1000.0,
        frame_sequence,
    }))
}
