//! Drowsy-duration state machine

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::classifier::DetectionResult;

/// Debounced driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrowsinessState {
    #[default]
    NoFace,
    Alert,
    /// Drowsy, but not yet for long enough to sound the alarm
    Warning,
    Alarm,
}

impl DrowsinessState {
    /// Short dashboard label
    pub fn label(&self) -> &'static str {
        match self {
            DrowsinessState::NoFace => "NO FACE",
            DrowsinessState::Alert => "ALERT",
            DrowsinessState::Warning | DrowsinessState::Alarm => "DROWSY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DrowsinessState::NoFace => "no_face",
            DrowsinessState::Alert => "alert",
            DrowsinessState::Warning => "warning",
            DrowsinessState::Alarm => "alarm",
        }
    }

    pub fn is_drowsy(&self) -> bool {
        matches!(self, DrowsinessState::Warning | DrowsinessState::Alarm)
    }
}

impl fmt::Display for DrowsinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start of the current run of consecutive drowsy observations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrowsyEpisode {
    started_at: Option<Instant>,
}

impl DrowsyEpisode {
    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Time since the episode began, zero when inactive
    pub fn duration(&self, now: Instant) -> Duration {
        self.started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    fn extend(&mut self, now: Instant) {
        self.started_at.get_or_insert(now);
    }

    fn clear(&mut self) {
        self.started_at = None;
    }
}

/// Result of feeding one observation to the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub state: DrowsinessState,
    pub previous: DrowsinessState,
    /// Length of the current drowsy episode, zero outside one
    pub drowsy_duration: Duration,
}

impl Assessment {
    pub fn changed(&self) -> bool {
        self.state != self.previous
    }
}

/// Debounces drowsy observations into WARNING, then ALARM
///
/// ALARM requires the episode to have lasted at least the threshold. Any
/// alert or no-face observation ends the episode and restarts the count.
#[derive(Debug, Clone)]
pub struct DrowsinessStateMachine {
    threshold: Duration,
    episode: DrowsyEpisode,
    state: DrowsinessState,
}

impl DrowsinessStateMachine {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            episode: DrowsyEpisode::default(),
            state: DrowsinessState::NoFace,
        }
    }

    pub fn state(&self) -> DrowsinessState {
        self.state
    }

    pub fn episode(&self) -> DrowsyEpisode {
        self.episode
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Takes effect on the next observation; a running episode keeps its start
    pub fn set_threshold(&mut self, threshold: Duration) {
        self.threshold = threshold;
    }

    /// Feed one classification made at `now`
    pub fn update(&mut self, result: &DetectionResult, now: Instant) -> Assessment {
        let previous = self.state;

        self.state = if !result.face_found {
            self.episode.clear();
            DrowsinessState::NoFace
        } else if result.is_drowsy_observation() {
            self.episode.extend(now);
            if self.episode.duration(now) >= self.threshold {
                DrowsinessState::Alarm
            } else {
                DrowsinessState::Warning
            }
        } else {
            // Unresolved eyes count as alert
            self.episode.clear();
            DrowsinessState::Alert
        };

        Assessment {
            state: self.state,
            previous,
            drowsy_duration: self.episode.duration(now),
        }
    }

    pub fn reset(&mut self) {
        self.episode.clear();
        self.state = DrowsinessState::NoFace;
    }
}

impl Default for DrowsinessStateMachine {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
