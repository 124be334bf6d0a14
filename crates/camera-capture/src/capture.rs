//! Background frame acquisition loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::probe::{open_verified, probe_candidates};
use crate::source::SourceSettings;
use crate::{CameraError, FrameBuffer, FrameSource, SourceDescriptor, SourceOpener};

/// Shared stop flag checked at the top of every worker loop iteration
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Candidates probed in order; the first that yields a frame wins
    pub candidates: Vec<SourceDescriptor>,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Requested frame rate
    pub fps: u32,
    /// Frames discarded after opening before the verification read
    pub warmup_frames: u32,
    /// Consecutive failed reads before the loop gives up
    pub max_consecutive_failures: u32,
    /// Pause after a failed read (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            candidates: SourceDescriptor::default_candidates(),
            width: 640,
            height: 480,
            fps: 15,
            warmup_frames: 5,
            max_consecutive_failures: 50,
            retry_backoff_ms: 100,
        }
    }
}

impl CaptureConfig {
    /// Camera-less configuration using the generated test pattern
    pub fn synthetic() -> Self {
        Self {
            candidates: vec![SourceDescriptor::Synthetic {
                width: 640,
                height: 480,
                fps: 15,
            }],
            warmup_frames: 0,
            ..Default::default()
        }
    }

    fn settings(&self) -> SourceSettings {
        SourceSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            warmup_frames: self.warmup_frames,
            max_consecutive_failures: self.max_consecutive_failures.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Read-failure handling of the acquisition loop
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub warmup_frames: u32,
    pub max_consecutive_failures: u32,
    pub backoff: Duration,
}

/// Why the acquisition loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// Stop flag observed
    Stopped,
    /// Too many consecutive read failures
    ExhaustedRetries { failures: u32 },
    /// Device disappeared and the single re-open attempt failed
    DeviceLost,
}

/// Cloneable view of the acquisition loop's liveness
#[derive(Debug, Clone)]
pub struct CaptureStatus {
    source: String,
    running: Arc<AtomicBool>,
}

impl CaptureStatus {
    /// Name of the source that passed probing
    pub fn source(&self) -> &str {
        &self.source
    }

    /// False once the loop has exited for any reason
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Handle to a running acquisition thread
pub struct CaptureHandle {
    status: CaptureStatus,
    thread: Option<JoinHandle<CaptureExit>>,
}

impl CaptureHandle {
    pub fn source(&self) -> &str {
        self.status.source()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn status(&self) -> CaptureStatus {
        self.status.clone()
    }

    /// Wait for the loop to exit; the caller must have raised the stop flag
    /// unless the loop already gave up
    pub fn join(mut self) -> Option<CaptureExit> {
        self.thread.take().and_then(|t| t.join().ok())
    }
}

/// Spawns the acquisition loop
pub struct CaptureService;

impl CaptureService {
    /// Probe `config.candidates` and start publishing into `buffer`
    ///
    /// Returns `DeviceUnavailable` when no candidate produces a frame; in that
    /// case no thread is left running and `buffer` stays empty.
    pub fn spawn(
        config: &CaptureConfig,
        buffer: Arc<FrameBuffer>,
        stop: StopFlag,
    ) -> Result<CaptureHandle, CameraError> {
        let settings = config.settings();
        let openers = config
            .candidates
            .iter()
            .map(|candidate| candidate.opener(settings))
            .collect();
        Self::spawn_with_openers(openers, config.retry_policy(), buffer, stop)
    }

    /// Same as [`CaptureService::spawn`] with caller-provided openers
    pub fn spawn_with_openers(
        openers: Vec<Box<dyn SourceOpener>>,
        policy: RetryPolicy,
        buffer: Arc<FrameBuffer>,
        stop: StopFlag,
    ) -> Result<CaptureHandle, CameraError> {
        // Sources are opened on the capture thread, so drivers need not be Send
        let (probe_tx, probe_rx) = mpsc::sync_channel::<Result<String, CameraError>>(1);
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = running.clone();

        let thread = thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || {
                let exit = match probe_candidates(&openers, policy.warmup_frames) {
                    Ok((index, source)) => {
                        let _ = probe_tx.send(Ok(source.name().to_string()));
                        run_loop(openers[index].as_ref(), source, &policy, &buffer, &stop)
                    }
                    Err(e) => {
                        let _ = probe_tx.send(Err(e));
                        CaptureExit::DeviceLost
                    }
                };
                running_flag.store(false, Ordering::SeqCst);
                exit
            })
            .map_err(|e| CameraError::DeviceUnavailable(format!("capture thread: {}", e)))?;

        match probe_rx.recv() {
            Ok(Ok(source)) => {
                info!("Frame capture started on {}", source);
                Ok(CaptureHandle {
                    status: CaptureStatus { source, running },
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                error!("No camera found: {}", e);
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CameraError::DeviceUnavailable(
                    "capture thread exited during probing".to_string(),
                ))
            }
        }
    }
}

fn run_loop(
    opener: &dyn SourceOpener,
    mut source: Box<dyn FrameSource>,
    policy: &RetryPolicy,
    buffer: &FrameBuffer,
    stop: &StopFlag,
) -> CaptureExit {
    let mut failures = 0u32;
    let mut sequence = 0u64;
    let mut reopened = false;

    let exit = loop {
        if stop.is_stopped() {
            break CaptureExit::Stopped;
        }

        match source.read() {
            Ok(frame) => {
                failures = 0;
                sequence += 1;
                buffer.publish(frame.with_sequence(sequence));
                metrics::counter!("camera_frames_total").increment(1);
            }
            Err(e) if e.is_device_lost() && !reopened => {
                reopened = true;
                warn!("{}: {}; attempting to re-open", source.name(), e);
                source.close();
                match open_verified(opener, policy.warmup_frames) {
                    Ok(fresh) => {
                        info!("Camera re-opened: {}", fresh.name());
                        source = fresh;
                        failures = 0;
                    }
                    Err(e) => {
                        error!("Failed to re-open camera: {}", e);
                        break CaptureExit::DeviceLost;
                    }
                }
            }
            Err(e) => {
                failures += 1;
                metrics::counter!("camera_read_failures_total").increment(1);
                warn!(
                    "Failed to read frame (attempt {}/{}): {}",
                    failures, policy.max_consecutive_failures, e
                );
                if failures >= policy.max_consecutive_failures {
                    error!("Too many consecutive failures, stopping capture thread");
                    break CaptureExit::ExhaustedRetries { failures };
                }
                thread::sleep(policy.backoff);
            }
        }
    };

    source.close();
    info!("Frame capture thread stopped ({:?})", exit);
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticOpener;
    use crate::testing::{Script, ScriptedOpener};
    use std::time::Instant;

    fn fast_policy(max_failures: u32) -> RetryPolicy {
        RetryPolicy {
            warmup_frames: 0,
            max_consecutive_failures: max_failures,
            backoff: Duration::from_millis(1),
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_publishes_until_stopped() {
        let buffer = Arc::new(FrameBuffer::new());
        let stop = StopFlag::new();
        let openers: Vec<Box<dyn SourceOpener>> = vec![Box::new(SyntheticOpener::new(8, 8, 500))];

        let handle =
            CaptureService::spawn_with_openers(openers, fast_policy(3), buffer.clone(), stop.clone())
                .unwrap();
        assert_eq!(handle.source(), "synthetic 8x8");

        let status = handle.status();
        wait_until(|| buffer.published() >= 5);
        assert!(status.is_running());
        stop.stop();
        assert_eq!(handle.join(), Some(CaptureExit::Stopped));
        assert!(!status.is_running());
        assert!(buffer.try_read().unwrap().sequence() >= 5);
    }

    #[test]
    fn test_no_device_fails_fast() {
        let (a, _) = ScriptedOpener::unopenable("a");
        let openers: Vec<Box<dyn SourceOpener>> = vec![Box::new(a)];
        let buffer = Arc::new(FrameBuffer::new());

        let result =
            CaptureService::spawn_with_openers(openers, fast_policy(3), buffer.clone(), StopFlag::new());

        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_gives_up_after_consecutive_failures_leaving_stale_frame() {
        // verification frame, one published frame, then nothing but failures
        let (opener, log) = ScriptedOpener::new("flaky", vec![Script::Frame, Script::Frame]);
        let openers: Vec<Box<dyn SourceOpener>> = vec![Box::new(opener)];
        let buffer = Arc::new(FrameBuffer::new());

        let handle =
            CaptureService::spawn_with_openers(openers, fast_policy(3), buffer.clone(), StopFlag::new())
                .unwrap();

        wait_until(|| !handle.is_running());
        assert_eq!(handle.join(), Some(CaptureExit::ExhaustedRetries { failures: 3 }));
        assert_eq!(buffer.try_read().unwrap().sequence(), 1);
        assert!(log.closed());
    }

    #[test]
    fn test_device_lost_reopens_once() {
        let script = vec![
            Script::Frame, // verification
            Script::Frame,
            Script::Lost,
            Script::Frame, // verification after re-open
            Script::Frame,
            Script::Lost, // second loss only counts as a failure
        ];
        let (opener, log) = ScriptedOpener::new("usb", script);
        let openers: Vec<Box<dyn SourceOpener>> = vec![Box::new(opener)];
        let buffer = Arc::new(FrameBuffer::new());

        let handle =
            CaptureService::spawn_with_openers(openers, fast_policy(2), buffer.clone(), StopFlag::new())
                .unwrap();

        wait_until(|| !handle.is_running());
        assert_eq!(handle.join(), Some(CaptureExit::ExhaustedRetries { failures: 2 }));
        assert_eq!(log.opened(), 2);
        assert_eq!(buffer.published(), 2);
    }

    #[test]
    fn test_failed_reopen_ends_loop() {
        let (opener, _) = ScriptedOpener::new("usb", vec![Script::Frame, Script::Lost]);
        let openers: Vec<Box<dyn SourceOpener>> = vec![Box::new(opener)];

        let handle = CaptureService::spawn_with_openers(
            openers,
            fast_policy(50),
            Arc::new(FrameBuffer::new()),
            StopFlag::new(),
        )
        .unwrap();

        wait_until(|| !handle.is_running());
        assert_eq!(handle.join(), Some(CaptureExit::DeviceLost));
    }
}
