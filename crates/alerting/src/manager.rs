//! Alert sink: state → indicator level, deduplicated hardware writes

use std::path::PathBuf;

use dms::{DrowsinessState, StateSink};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::gpio::{IndicatorDriver, SysfsGpioDriver};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Drive real GPIO lines; otherwise indication is software-only
    pub enabled: bool,
    pub buzzer_pin: u32,
    pub red_pin: u32,
    pub yellow_pin: u32,
    pub green_pin: u32,
    /// sysfs GPIO root (default: /sys/class/gpio)
    pub gpio_root: PathBuf,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buzzer_pin: 17,
            red_pin: 22,
            yellow_pin: 27,
            green_pin: 24,
            gpio_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// What the driver should see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorLevel {
    Off,
    Green,
    Yellow,
    /// Red LED plus buzzer
    Red,
}

impl IndicatorLevel {
    pub fn for_state(state: DrowsinessState) -> Self {
        match state {
            DrowsinessState::NoFace => IndicatorLevel::Off,
            DrowsinessState::Alert => IndicatorLevel::Green,
            DrowsinessState::Warning => IndicatorLevel::Yellow,
            DrowsinessState::Alarm => IndicatorLevel::Red,
        }
    }

    /// (red, yellow, green)
    pub fn leds(&self) -> (bool, bool, bool) {
        match self {
            IndicatorLevel::Off => (false, false, false),
            IndicatorLevel::Green => (false, false, true),
            IndicatorLevel::Yellow => (false, true, false),
            IndicatorLevel::Red => (true, false, false),
        }
    }

    pub fn buzzer(&self) -> bool {
        matches!(self, IndicatorLevel::Red)
    }
}

/// Drives the indicator from the debounced state
///
/// Remembers the last level written and skips writes that would not change
/// it. Without a driver every call is a no-op apart from bookkeeping.
pub struct AlertSink {
    driver: Option<Box<dyn IndicatorDriver>>,
    current: Option<IndicatorLevel>,
    writes: u64,
}

impl AlertSink {
    pub fn new(driver: Box<dyn IndicatorDriver>) -> Self {
        Self {
            driver: Some(driver),
            current: None,
            writes: 0,
        }
    }

    /// Software-only indication
    pub fn detached() -> Self {
        Self {
            driver: None,
            current: None,
            writes: 0,
        }
    }

    /// GPIO sink when enabled and available, detached otherwise
    pub fn from_config(config: &AlertConfig) -> Self {
        if !config.enabled {
            info!("Alert hardware disabled, indication is software-only");
            return Self::detached();
        }
        match SysfsGpioDriver::open(config) {
            Ok(driver) => Self::new(Box::new(driver)),
            Err(e) => {
                warn!("Alert hardware unavailable, continuing without it: {}", e);
                Self::detached()
            }
        }
    }

    pub fn has_hardware(&self) -> bool {
        self.driver.is_some()
    }

    /// Last level successfully written
    pub fn current_level(&self) -> Option<IndicatorLevel> {
        self.current
    }

    /// Hardware writes issued so far
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn apply(&mut self, state: DrowsinessState) {
        self.set_level(IndicatorLevel::for_state(state));
    }

    pub fn all_off(&mut self) {
        self.set_level(IndicatorLevel::Off);
    }

    fn set_level(&mut self, level: IndicatorLevel) {
        if self.current == Some(level) {
            return;
        }
        let Some(driver) = self.driver.as_mut() else {
            self.current = Some(level);
            return;
        };

        let (red, yellow, green) = level.leds();
        let result = driver
            .set_leds(red, yellow, green)
            .and_then(|_| driver.set_buzzer(level.buzzer()));
        self.writes += 1;

        match result {
            Ok(()) => {
                debug!("Indicator set to {:?}", level);
                self.current = Some(level);
            }
            Err(e) => {
                // Unknown hardware state: retry on the next apply
                error!("Failed to set indicator to {:?}: {}", level, e);
                self.current = None;
            }
        }
    }

    /// Turn everything off and release the driver; later calls are no-ops
    pub fn release(&mut self) {
        self.all_off();
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.release() {
                warn!("Failed to release alert hardware: {}", e);
            }
        }
    }
}

impl StateSink for AlertSink {
    fn apply(&mut self, state: DrowsinessState) {
        AlertSink::apply(self, state);
    }

    fn release(&mut self) {
        AlertSink::release(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertError;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Write {
        Leds(bool, bool, bool),
        Buzzer(bool),
        Release,
    }

    #[derive(Clone, Default)]
    struct RecordingDriver {
        log: Arc<Mutex<Vec<Write>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl RecordingDriver {
        fn writes(&self) -> Vec<Write> {
            self.log.lock().unwrap().clone()
        }

        fn set_failing(&self, failing: bool) {
            *self.fail.lock().unwrap() = failing;
        }
    }

    impl IndicatorDriver for RecordingDriver {
        fn set_leds(&mut self, red: bool, yellow: bool, green: bool) -> Result<(), AlertError> {
            if *self.fail.lock().unwrap() {
                return Err(AlertError::Hardware("line busy".into()));
            }
            self.log.lock().unwrap().push(Write::Leds(red, yellow, green));
            Ok(())
        }

        fn set_buzzer(&mut self, on: bool) -> Result<(), AlertError> {
            self.log.lock().unwrap().push(Write::Buzzer(on));
            Ok(())
        }

        fn release(&mut self) -> Result<(), AlertError> {
            self.log.lock().unwrap().push(Write::Release);
            Ok(())
        }
    }

    fn sink() -> (AlertSink, RecordingDriver) {
        let driver = RecordingDriver::default();
        (AlertSink::new(Box::new(driver.clone())), driver)
    }

    #[test]
    fn test_mapping_table() {
        assert_eq!(IndicatorLevel::for_state(DrowsinessState::NoFace).leds(), (false, false, false));
        assert_eq!(IndicatorLevel::for_state(DrowsinessState::Alert).leds(), (false, false, true));
        assert_eq!(IndicatorLevel::for_state(DrowsinessState::Warning).leds(), (false, true, false));
        assert_eq!(IndicatorLevel::for_state(DrowsinessState::Alarm).leds(), (true, false, false));
        assert!(IndicatorLevel::Red.buzzer());
        assert!(!IndicatorLevel::Yellow.buzzer());
    }

    #[test]
    fn test_repeated_alarm_writes_once() {
        let (mut sink, driver) = sink();
        sink.apply(DrowsinessState::Alarm);
        sink.apply(DrowsinessState::Alarm);

        assert_eq!(
            driver.writes(),
            vec![Write::Leds(true, false, false), Write::Buzzer(true)]
        );
        assert_eq!(sink.writes(), 1);
        assert_eq!(sink.current_level(), Some(IndicatorLevel::Red));
    }

    #[test]
    fn test_face_loss_turns_everything_off() {
        let (mut sink, driver) = sink();
        sink.apply(DrowsinessState::Alarm);
        sink.apply(DrowsinessState::NoFace);

        assert_eq!(
            driver.writes()[2..].to_vec(),
            vec![Write::Leds(false, false, false), Write::Buzzer(false)]
        );
    }

    #[test]
    fn test_failed_write_is_retried() {
        let (mut sink, driver) = sink();
        driver.set_failing(true);
        sink.apply(DrowsinessState::Warning);
        assert_eq!(sink.current_level(), None);

        driver.set_failing(false);
        sink.apply(DrowsinessState::Warning);
        assert_eq!(sink.current_level(), Some(IndicatorLevel::Yellow));
        assert_eq!(driver.writes()[0], Write::Leds(false, true, false));
    }

    #[test]
    fn test_release_turns_off_then_releases_once() {
        let (mut sink, driver) = sink();
        sink.apply(DrowsinessState::Alert);
        sink.release();
        sink.release();

        let writes = driver.writes();
        assert_eq!(writes.iter().filter(|w| **w == Write::Release).count(), 1);
        assert_eq!(writes.last(), Some(&Write::Release));
        assert_eq!(writes[writes.len() - 3], Write::Leds(false, false, false));
        assert!(!sink.has_hardware());
    }

    #[test]
    fn test_detached_sink_is_noop() {
        let mut sink = AlertSink::from_config(&AlertConfig::default());
        assert!(!sink.has_hardware());
        sink.apply(DrowsinessState::Alarm);
        sink.all_off();
        sink.release();
        assert_eq!(sink.writes(), 0);
        assert_eq!(sink.current_level(), Some(IndicatorLevel::Off));
    }

    fn any_state() -> impl Strategy<Value = DrowsinessState> {
        prop_oneof![
            Just(DrowsinessState::NoFace),
            Just(DrowsinessState::Alert),
            Just(DrowsinessState::Warning),
            Just(DrowsinessState::Alarm),
        ]
    }

    proptest! {
        #[test]
        fn prop_writes_only_on_level_change(states in proptest::collection::vec(any_state(), 0..100)) {
            let (mut sink, _) = sink();
            let mut changes = 0u64;
            let mut last = None;
            for state in states {
                let level = IndicatorLevel::for_state(state);
                if last != Some(level) {
                    changes += 1;
                    last = Some(level);
                }
                sink.apply(state);
            }
            prop_assert_eq!(sink.writes(), changes);
        }
    }
}
