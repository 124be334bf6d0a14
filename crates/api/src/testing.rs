//! Shared test fixtures

use std::sync::Arc;
use std::time::Instant;

use camera_capture::{Frame, FrameBuffer, SourceDescriptor, StopFlag};
use dms::{BoundingBox, Classifier, DetectionResult, DmsError, MonitorShared, SharedClassifier};
use video_stream::{NoOverlay, StreamRenderer};

use crate::config::AppConfig;
use crate::AppState;

/// Always returns the same result
pub(crate) struct FixedClassifier(DetectionResult);

impl FixedClassifier {
    pub(crate) fn alert() -> Self {
        Self(DetectionResult::scored(BoundingBox::new(8, 8, 32, 24), 0.9, 0.65))
    }
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn classify(&mut self, _frame: &Frame, _threshold: f32) -> Result<DetectionResult, DmsError> {
        Ok(self.0.clone())
    }
}

/// Fast, camera-less configuration
pub(crate) fn synthetic_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.camera.candidates = vec![SourceDescriptor::Synthetic {
        width: 64,
        height: 48,
        fps: 100,
    }];
    config.camera.warmup_frames = 0;
    config.detection.interval_ms = 5;
    config.detection.idle_poll_ms = 2;
    config.stream.width = 32;
    config.stream.height = 24;
    config.stream.idle_poll_ms = 2;
    config.server.shutdown_grace_ms = 10;
    config
}

/// Grey 64x48 frame
pub(crate) fn grey_frame(sequence: u64) -> Frame {
    Frame::new(vec![128; 64 * 48 * 3], 64, 48, sequence).unwrap()
}

/// Handler state without background threads
pub(crate) fn idle_state(frame: Option<Frame>) -> AppState {
    let config = synthetic_config();
    let buffer = Arc::new(FrameBuffer::new());
    if let Some(frame) = frame {
        buffer.publish(frame);
    }
    AppState {
        shared: Arc::new(MonitorShared::new(&config.detection)),
        classifier: SharedClassifier::new(FixedClassifier::alert()),
        buffer: buffer.clone(),
        renderer: StreamRenderer::new(config.stream, buffer, Arc::new(NoOverlay)),
        stop: StopFlag::new(),
        camera: None,
        alert_hardware: false,
        metrics: None,
        version: "test".to_string(),
        start_time: Instant::now(),
    }
}
