//! Process wiring: capture, detection, alerts and rendering

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use alerting::AlertSink;
use camera_capture::{CaptureHandle, CaptureService, CaptureStatus, FrameBuffer, StopFlag};
use dms::{
    DetectionHandle, DetectionLoop, Monitor, MonitorShared, NoModelClassifier, SharedClassifier,
};
use tracing::{info, warn};
use video_stream::{ClassifierOverlay, NoOverlay, OverlayMode, OverlaySource, StreamRenderer};

use crate::config::{AppConfig, ModelConfig};
use crate::ApiError;

/// Every running part of the monitor
///
/// Built explicitly so independent instances can coexist in tests.
pub struct Pipeline {
    pub buffer: Arc<FrameBuffer>,
    pub shared: Arc<MonitorShared>,
    pub classifier: SharedClassifier,
    pub renderer: StreamRenderer,
    stop: StopFlag,
    camera: CaptureStatus,
    alert_hardware: bool,
    grace: Duration,
    capture: Option<CaptureHandle>,
    detection: Option<DetectionHandle>,
}

impl Pipeline {
    /// Start with the configured model and alert hardware
    pub fn start(config: &AppConfig) -> Result<Self, ApiError> {
        let classifier = load_classifier(&config.model);
        let sink = AlertSink::from_config(&config.alerts);
        Self::start_with(config, classifier, sink)
    }

    /// Start with caller-provided classifier and sink
    ///
    /// Fails only when no camera candidate produces a frame.
    pub fn start_with(
        config: &AppConfig,
        classifier: SharedClassifier,
        sink: AlertSink,
    ) -> Result<Self, ApiError> {
        let buffer = Arc::new(FrameBuffer::new());
        let stop = StopFlag::new();

        let capture = CaptureService::spawn(&config.camera, buffer.clone(), stop.clone())?;
        let camera = capture.status();

        let shared = Arc::new(MonitorShared::new(&config.detection));
        let alert_hardware = sink.has_hardware();
        let monitor = Monitor::new(classifier.clone(), shared.clone(), Box::new(sink));
        let detection = match DetectionLoop::spawn(&config.detection, monitor, buffer.clone(), stop.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                stop.stop();
                let _ = capture.join();
                return Err(e.into());
            }
        };

        let overlay: Arc<dyn OverlaySource> = match config.stream.overlay {
            OverlayMode::Latest => shared.clone(),
            OverlayMode::Classify => Arc::new(ClassifierOverlay::new(classifier.clone(), shared.clone())),
            OverlayMode::None => Arc::new(NoOverlay),
        };
        let renderer = StreamRenderer::new(config.stream.clone(), buffer.clone(), overlay);

        info!(
            "Pipeline running: camera={}, classifier={}, alert hardware={}",
            camera.source(),
            classifier.name(),
            alert_hardware
        );

        Ok(Self {
            buffer,
            shared,
            classifier,
            renderer,
            stop,
            camera,
            alert_hardware,
            grace: config.server.shutdown_grace(),
            capture: Some(capture),
            detection: Some(detection),
        })
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn camera(&self) -> CaptureStatus {
        self.camera.clone()
    }

    pub fn has_alert_hardware(&self) -> bool {
        self.alert_hardware
    }

    /// Stop flag, grace period, join workers, then release the alert sink
    pub fn shutdown(&mut self) {
        if self.capture.is_none() && self.detection.is_none() {
            return;
        }
        info!("Shutting down pipeline");
        self.stop.stop();
        thread::sleep(self.grace);

        if let Some(capture) = self.capture.take() {
            let exit = capture.join();
            info!("Capture loop finished: {:?}", exit);
        }
        if let Some(detection) = self.detection.take() {
            match detection.join() {
                Some(mut sink) => sink.release(),
                None => warn!("Detection thread panicked; alert sink dropped without release"),
            }
        }
        info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(model: &ModelConfig) -> SharedClassifier {
    if let Some(path) = &model.path {
        warn!(
            "Model {} ignored: built without ONNX support, no faces will be reported",
            path.display()
        );
    } else {
        warn!("No model configured, no faces will be reported");
    }
    SharedClassifier::new(NoModelClassifier)
}

#[cfg(feature = "onnx")]
fn load_classifier(model: &ModelConfig) -> SharedClassifier {
    use dms::{CenterRegionLocator, OnnxClassifier};

    let Some(path) = &model.path else {
        warn!("No model configured, no faces will be reported");
        return SharedClassifier::new(NoModelClassifier);
    };
    match OnnxClassifier::load(path, model.input_size, CenterRegionLocator::default()) {
        Ok(classifier) => SharedClassifier::new(classifier),
        Err(e) => {
            tracing::error!("Failed to load model, continuing without it: {}", e);
            SharedClassifier::new(NoModelClassifier)
        }
    }
}
