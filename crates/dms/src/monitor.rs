//! Detection loop: latest frame → classifier → state machine → alerts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use camera_capture::{Frame, FrameBuffer, StopFlag};
use tracing::{debug, error, info, warn};

use crate::analysis::StatusSnapshot;
use crate::classifier::{DetectionResult, SharedClassifier};
use crate::config::{DetectionSettings, DmsConfig};
use crate::state::{Assessment, DrowsinessState, DrowsinessStateMachine};
use crate::statistics::RunningStatistics;
use crate::DmsError;

/// Receives the debounced state once per successful cycle
pub trait StateSink: Send {
    fn apply(&mut self, state: DrowsinessState);

    /// Turn everything off and let go of the hardware
    fn release(&mut self) {}
}

/// No indicator hardware attached
impl StateSink for () {
    fn apply(&mut self, _state: DrowsinessState) {}
}

/// State shared between the detection loop and its readers
///
/// Every lock is held only for a copy or a counter bump; none is held while
/// classifying.
#[derive(Debug)]
pub struct MonitorShared {
    settings: RwLock<DetectionSettings>,
    statistics: Mutex<RunningStatistics>,
    status: Mutex<StatusSnapshot>,
    latest: Mutex<Option<DetectionResult>>,
    classifier_errors: AtomicU64,
}

fn recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MonitorShared {
    pub fn new(config: &DmsConfig) -> Self {
        let settings = config.settings();
        Self {
            settings: RwLock::new(settings),
            statistics: Mutex::new(RunningStatistics::new(config.inference_history)),
            status: Mutex::new(StatusSnapshot::idle(settings.drowsy_duration())),
            latest: Mutex::new(None),
            classifier_errors: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> DetectionSettings {
        *self
            .settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate and install new thresholds, used from the next cycle on
    pub fn update_settings(&self, settings: DetectionSettings) -> Result<(), DmsError> {
        settings.validate()?;
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = settings;
        info!(
            "Detection settings updated: threshold={:.2}, drowsy duration={:.1}s",
            settings.confidence_threshold, settings.drowsy_duration_secs
        );
        Ok(())
    }

    /// Best-known state with live statistics
    pub fn status(&self) -> StatusSnapshot {
        let snapshot = recover(&self.status).clone();
        let stats = recover(&self.statistics);
        snapshot.with_statistics(&stats)
    }

    /// Operator reset of the session counters
    pub fn reset_statistics(&self) {
        recover(&self.statistics).reset();
        info!("Statistics reset");
    }

    /// Most recent classification, for overlays
    pub fn latest_detection(&self) -> Option<DetectionResult> {
        recover(&self.latest).clone()
    }

    pub fn classifier_errors(&self) -> u64 {
        self.classifier_errors.load(Ordering::Relaxed)
    }

    fn record(&self, result: &DetectionResult, latency: std::time::Duration) {
        let mut stats = recover(&self.statistics);
        stats.record_inference(latency);
        if result.face_found {
            stats.record_observation(result.is_drowsy_observation());
        }
    }

    fn publish(&self, snapshot: StatusSnapshot, result: DetectionResult) {
        *recover(&self.status) = snapshot;
        *recover(&self.latest) = Some(result);
    }
}

/// One detection pipeline: classifier, state machine and alert sink
pub struct Monitor {
    classifier: SharedClassifier,
    machine: DrowsinessStateMachine,
    shared: Arc<MonitorShared>,
    sink: Box<dyn StateSink>,
}

impl Monitor {
    pub fn new(
        classifier: SharedClassifier,
        shared: Arc<MonitorShared>,
        sink: Box<dyn StateSink>,
    ) -> Self {
        let machine = DrowsinessStateMachine::new(shared.settings().drowsy_duration());
        Self {
            classifier,
            machine,
            shared,
            sink,
        }
    }

    pub fn state(&self) -> DrowsinessState {
        self.machine.state()
    }

    /// Run one cycle on `frame` observed at `now`
    ///
    /// Returns `None` when the classifier failed; the state and the running
    /// episode are then left untouched.
    pub fn step(&mut self, frame: &Frame, now: Instant) -> Option<Assessment> {
        let settings = self.shared.settings();
        let threshold = settings.drowsy_duration();
        self.machine.set_threshold(threshold);

        let classification = match self.classifier.classify(frame, settings.confidence_threshold) {
            Ok(classification) => classification,
            Err(e) => {
                self.shared.classifier_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("dms_classifications_total", "outcome" => "error").increment(1);
                error!("Classification failed, holding {}: {}", self.machine.state(), e);
                return None;
            }
        };

        let result = classification.result;
        let assessment = self.machine.update(&result, now);
        self.shared.record(&result, classification.latency);

        if assessment.changed() {
            log_transition(&assessment);
            metrics::gauge!("dms_state", "state" => assessment.previous.as_str()).set(0.0);
        }
        metrics::gauge!("dms_state", "state" => assessment.state.as_str()).set(1.0);
        metrics::counter!("dms_classifications_total", "outcome" => assessment.state.as_str())
            .increment(1);
        metrics::histogram!("dms_inference_seconds").record(classification.latency.as_secs_f64());

        self.sink.apply(assessment.state);

        let snapshot =
            StatusSnapshot::from_cycle(&result, &assessment, threshold, frame.age(), frame.sequence());
        self.shared.publish(snapshot, result);

        Some(assessment)
    }

    /// Hand back the sink so the caller can release it after the loop exits
    pub fn into_sink(self) -> Box<dyn StateSink> {
        self.sink
    }
}

fn log_transition(assessment: &Assessment) {
    match (assessment.previous, assessment.state) {
        (_, DrowsinessState::Alarm) => warn!(
            "ALARM: driver drowsy for {:.1}s",
            assessment.drowsy_duration.as_secs_f64()
        ),
        (_, DrowsinessState::Warning) => info!("Drowsiness episode started"),
        (DrowsinessState::Warning | DrowsinessState::Alarm, DrowsinessState::Alert) => {
            info!("Driver alert again")
        }
        (_, DrowsinessState::NoFace) => info!("No face detected"),
        (from, to) => debug!("State {} -> {}", from, to),
    }
}

/// Handle to the running detection thread
pub struct DetectionHandle {
    thread: JoinHandle<Box<dyn StateSink>>,
}

impl DetectionHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to observe the stop flag; returns the alert sink
    pub fn join(self) -> Option<Box<dyn StateSink>> {
        self.thread.join().ok()
    }
}

/// Spawns the periodic detection loop
pub struct DetectionLoop;

impl DetectionLoop {
    pub fn spawn(
        config: &DmsConfig,
        monitor: Monitor,
        buffer: Arc<FrameBuffer>,
        stop: StopFlag,
    ) -> Result<DetectionHandle, DmsError> {
        let interval = config.interval();
        let idle_poll = config.idle_poll();

        let thread = thread::Builder::new()
            .name("drowsiness-detection".into())
            .spawn(move || {
                let mut monitor = monitor;
                info!("Drowsiness detection started ({})", monitor.classifier.name());

                while !stop.is_stopped() {
                    let Some(frame) = buffer.try_read() else {
                        thread::sleep(idle_poll);
                        continue;
                    };
                    monitor.step(&frame, Instant::now());
                    thread::sleep(interval);
                }

                info!("Drowsiness detection stopped");
                monitor.into_sink()
            })
            .map_err(|e| DmsError::Config(format!("detection thread: {}", e)))?;

        Ok(DetectionHandle { thread })
    }
}
