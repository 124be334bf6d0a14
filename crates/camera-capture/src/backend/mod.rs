//! Built-in frame sources

mod device;
mod replay;
mod synthetic;

pub use device::DeviceOpener;
pub use replay::{ReplayOpener, ReplaySource};
pub use synthetic::{SyntheticOpener, SyntheticSource};

use std::time::{Duration, Instant};

/// Sleeps so that consecutive reads are spaced at `1/fps`
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Pacer {
    pub(crate) fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_micros(1_000_000 / fps.max(1) as u64),
            next_due: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        // Never try to catch up on missed slots
        self.next_due = Some(Instant::now() + self.interval);
    }
}
