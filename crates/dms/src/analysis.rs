//! Telemetry snapshot published after every detection cycle

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::classifier::{BoundingBox, DetectionResult};
use crate::state::{Assessment, DrowsinessState};
use crate::statistics::{RunningStatistics, StatsSnapshot};

/// Dashboard view of the monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: DrowsinessState,
    /// NO FACE / ALERT / DROWSY
    pub status: String,
    pub face_detected: bool,
    pub is_drowsy: Option<bool>,
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_box: Option<BoundingBox>,
    /// Current episode length (seconds)
    pub drowsy_duration: f64,
    pub alarm_active: bool,
    /// Episode length that sounds the alarm (seconds)
    pub alarm_threshold: f64,
    pub stats: StatsSnapshot,
    pub mean_inference_ms: Option<f64>,
    pub estimated_fps: Option<f64>,
    pub session_seconds: f64,
    /// Age of the classified frame when the cycle finished
    pub frame_age_ms: Option<u64>,
    pub frame_sequence: Option<u64>,
    /// Wall clock of the last update, zero before the first cycle
    pub updated_at_ms: u64,
}

impl StatusSnapshot {
    /// Snapshot before any frame has been classified
    pub fn idle(alarm_threshold: Duration) -> Self {
        Self {
            status: DrowsinessState::NoFace.label().to_string(),
            alarm_threshold: alarm_threshold.as_secs_f64(),
            ..Default::default()
        }
    }

    /// Build from one cycle's outcome
    pub fn from_cycle(
        result: &DetectionResult,
        assessment: &Assessment,
        alarm_threshold: Duration,
        frame_age: Duration,
        frame_sequence: u64,
    ) -> Self {
        Self {
            state: assessment.state,
            status: assessment.state.label().to_string(),
            face_detected: result.face_found,
            is_drowsy: result.is_drowsy,
            confidence: result.confidence,
            face_box: result.face_box,
            drowsy_duration: assessment.drowsy_duration.as_secs_f64(),
            alarm_active: assessment.state == DrowsinessState::Alarm,
            alarm_threshold: alarm_threshold.as_secs_f64(),
            stats: StatsSnapshot::default(),
            mean_inference_ms: None,
            estimated_fps: None,
            session_seconds: 0.0,
            frame_age_ms: Some(frame_age.as_millis() as u64),
            frame_sequence: Some(frame_sequence),
            updated_at_ms: unix_millis(),
        }
    }

    /// Overlay the current session statistics
    pub fn with_statistics(mut self, stats: &RunningStatistics) -> Self {
        self.stats = stats.counts();
        self.mean_inference_ms = stats.mean_inference_ms();
        self.estimated_fps = stats.estimated_fps();
        self.session_seconds = stats.session_elapsed().as_secs_f64();
        self
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
