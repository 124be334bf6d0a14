//! Generated moving test pattern, always available

use tracing::debug;

use super::Pacer;
use crate::{CameraError, Frame, FrameSource, SourceOpener};

/// Largest side the pattern generator accepts
pub const MAX_SYNTHETIC_SIDE: u32 = 8192;

/// Opener for the synthetic pattern source
#[derive(Debug, Clone)]
pub struct SyntheticOpener {
    width: u32,
    height: u32,
    fps: u32,
}

impl SyntheticOpener {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl SourceOpener for SyntheticOpener {
    fn describe(&self) -> String {
        format!("synthetic:{}x{}@{}", self.width, self.height, self.fps)
    }

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let side_ok = |side: u32| (1..=MAX_SYNTHETIC_SIDE).contains(&side);
        if !side_ok(self.width) || !side_ok(self.height) {
            return Err(CameraError::DeviceUnavailable(self.describe()));
        }
        Ok(Box::new(SyntheticSource::new(self.width, self.height, self.fps)))
    }
}

/// Vertical bar sweeping across a gray background
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    pacer: Pacer,
    counter: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            name: format!("synthetic {}x{}", width, height),
            width,
            height,
            pacer: Pacer::new(fps),
            counter: 0,
            open: true,
        }
    }

    fn render(&self) -> Vec<u8> {
        let bar_width = (self.width / 8).max(1);
        let bar_x = (self.counter * 4 % self.width as u64) as u32;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for _y in 0..self.height {
            for x in 0..self.width {
                if x >= bar_x && x - bar_x < bar_width {
                    data.extend_from_slice(&[230, 230, 230]);
                } else {
                    data.extend_from_slice(&[64, 64, 64]);
                }
            }
        }
        data
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<Frame, CameraError> {
        if !self.open {
            return Err(CameraError::NotInitialized);
        }
        self.pacer.wait();
        self.counter += 1;
        Frame::new(self.render(), self.width, self.height, self.counter)
    }

    fn close(&mut self) {
        if self.open {
            debug!("Closing {}", self.name);
            self.open = false;
        }
    }
}
