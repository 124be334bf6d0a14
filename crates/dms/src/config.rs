//! DMS configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Pause between classification cycles (milliseconds, ~10 Hz by default)
    pub interval_ms: u64,

    /// Pause when no frame has been published yet (milliseconds)
    pub idle_poll_ms: u64,

    /// Classifier confidence below this is a drowsy observation
    pub confidence_threshold: f32,

    /// Continuous drowsy time before the alarm sounds (seconds)
    pub drowsy_duration_secs: f64,

    /// Number of recent inference latencies kept for the running mean
    pub inference_history: usize,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            idle_poll_ms: 100,
            confidence_threshold: 0.65,
            drowsy_duration_secs: 3.0,
            inference_history: 100,
        }
    }
}

impl DmsConfig {
    /// Faster alarm (2 s debounce) used by the on-demand dashboard variant
    pub fn responsive() -> Self {
        Self {
            drowsy_duration_secs: 2.0,
            ..Default::default()
        }
    }

    /// Reject values the detection loop cannot work with
    pub fn validate(&self) -> Result<(), DmsError> {
        self.settings().validate()?;
        if self.inference_history == 0 {
            return Err(DmsError::Config("inference_history must be at least 1".into()));
        }
        Ok(())
    }

    /// Runtime-tunable part of the configuration
    pub fn settings(&self) -> DetectionSettings {
        DetectionSettings {
            confidence_threshold: self.confidence_threshold,
            drowsy_duration_secs: self.drowsy_duration_secs,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}

/// Longest accepted drowsy debounce (one hour)
pub const MAX_DROWSY_DURATION_SECS: f64 = 3600.0;

/// Thresholds that an operator may change while the monitor runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub drowsy_duration_secs: f64,
}

impl DetectionSettings {
    pub fn validate(&self) -> Result<(), DmsError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DmsError::Config(format!(
                "confidence_threshold must be within 0..1, got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=MAX_DROWSY_DURATION_SECS).contains(&self.drowsy_duration_secs) {
            return Err(DmsError::Config(format!(
                "drowsy_duration_secs must be within 0..{}, got {}",
                MAX_DROWSY_DURATION_SECS, self.drowsy_duration_secs
            )));
        }
        Ok(())
    }

    /// Debounce as a `Duration`; out-of-range values saturate instead of panicking
    pub fn drowsy_duration(&self) -> Duration {
        let secs = self.drowsy_duration_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) => duration,
            Err(_) if secs > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        DmsConfig::default().settings()
    }
}
