//! Session counters and inference timing

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Observation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Cycles in which a face was found
    pub total: u64,
    pub drowsy: u64,
    pub alert: u64,
}

/// Running counters for one monitoring session
#[derive(Debug, Clone)]
pub struct RunningStatistics {
    counts: StatsSnapshot,
    inference_ms: VecDeque<f64>,
    capacity: usize,
    session_started: Option<Instant>,
}

impl RunningStatistics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            counts: StatsSnapshot::default(),
            inference_ms: VecDeque::with_capacity(capacity),
            capacity,
            session_started: None,
        }
    }

    /// Count one cycle in which a face was found
    pub fn record_observation(&mut self, is_drowsy: bool) {
        self.session_started.get_or_insert_with(Instant::now);
        self.counts.total += 1;
        if is_drowsy {
            self.counts.drowsy += 1;
        } else {
            self.counts.alert += 1;
        }
    }

    /// Add a latency sample, evicting the oldest beyond capacity
    pub fn record_inference(&mut self, latency: Duration) {
        if self.inference_ms.len() == self.capacity {
            self.inference_ms.pop_front();
        }
        self.inference_ms.push_back(latency.as_secs_f64() * 1000.0);
    }

    pub fn counts(&self) -> StatsSnapshot {
        self.counts
    }

    pub fn inference_samples(&self) -> usize {
        self.inference_ms.len()
    }

    /// Mean over retained samples
    pub fn mean_inference_ms(&self) -> Option<f64> {
        if self.inference_ms.is_empty() {
            return None;
        }
        Some(self.inference_ms.iter().sum::<f64>() / self.inference_ms.len() as f64)
    }

    /// Throughput the classifier could sustain at the mean latency
    pub fn estimated_fps(&self) -> Option<f64> {
        self.mean_inference_ms()
            .filter(|ms| *ms > 0.0)
            .map(|ms| 1000.0 / ms)
    }

    /// Time since the first face of the session, zero before it
    pub fn session_elapsed(&self) -> Duration {
        self.session_started
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    /// Zero the counters and timings and start a new session
    pub fn reset(&mut self) {
        self.counts = StatsSnapshot::default();
        self.inference_ms.clear();
        self.session_started = None;
    }
}

impl Default for RunningStatistics {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_counts_partition_total() {
        let mut stats = RunningStatistics::default();
        for i in 0..10 {
            stats.record_observation(i % 3 == 0);
        }
        let counts = stats.counts();
        assert_eq!(counts.total, 10);
        assert_eq!(counts.drowsy, 4);
        assert_eq!(counts.alert, 6);
    }

    #[test]
    fn test_mean_and_eviction() {
        let mut stats = RunningStatistics::new(3);
        assert_eq!(stats.mean_inference_ms(), None);
        assert_eq!(stats.estimated_fps(), None);

        for ms in [10, 20, 30, 40] {
            stats.record_inference(Duration::from_millis(ms));
        }
        assert_eq!(stats.inference_samples(), 3);
        let mean = stats.mean_inference_ms().unwrap();
        assert!((mean - 30.0).abs() < 1e-9);
        assert!((stats.estimated_fps().unwrap() - 1000.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut stats = RunningStatistics::default();
        stats.record_observation(true);
        stats.record_inference(Duration::from_millis(5));
        stats.reset();
        assert_eq!(stats.counts(), StatsSnapshot::default());
        assert_eq!(stats.inference_samples(), 0);
        assert_eq!(stats.session_elapsed(), Duration::ZERO);
    }

    proptest! {
        #[test]
        fn prop_ring_never_exceeds_capacity(
            capacity in 1usize..150,
            samples in proptest::collection::vec(0u64..500, 0..400),
        ) {
            let mut stats = RunningStatistics::new(capacity);
            for ms in &samples {
                stats.record_inference(Duration::from_millis(*ms));
            }
            prop_assert_eq!(stats.inference_samples(), samples.len().min(capacity));
        }
    }
}
