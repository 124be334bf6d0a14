//! Driver Alerting
//!
//! Maps the debounced drowsiness state onto a three-level LED indicator and
//! a buzzer, writing to hardware only when the level changes.

mod gpio;
mod manager;

pub use gpio::{IndicatorDriver, SysfsGpioDriver};
pub use manager::{AlertConfig, AlertSink, IndicatorLevel};

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Indicator hardware error: {0}")]
    Hardware(String),
}

impl From<std::io::Error> for AlertError {
    fn from(e: std::io::Error) -> Self {
        AlertError::Hardware(e.to_string())
    }
}
