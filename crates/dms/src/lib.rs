//! Driver Monitoring System (DMS)
//!
//! Turns noisy per-frame eye/face classifications into a debounced
//! drowsy/alert decision:
//! - Classifier contract and the inference-serializing shared handle
//! - Drowsy-duration state machine (NO_FACE / ALERT / WARNING / ALARM)
//! - Running statistics and the telemetry snapshot
//! - The detection loop tying frames, classifier, state and alerts together

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod monitor;
pub mod state;
pub mod statistics;

pub use analysis::StatusSnapshot;
pub use classifier::{
    BoundingBox, Classification, Classifier, DetectionResult, NoModelClassifier, SharedClassifier,
};
pub use config::{DetectionSettings, DmsConfig};
pub use monitor::{DetectionHandle, DetectionLoop, Monitor, MonitorShared, StateSink};
pub use state::{Assessment, DrowsinessState, DrowsinessStateMachine, DrowsyEpisode};
pub use statistics::{RunningStatistics, StatsSnapshot};

#[cfg(feature = "onnx")]
pub use classifier::onnx::{CenterRegionLocator, FaceLocator, OnnxClassifier};

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}
