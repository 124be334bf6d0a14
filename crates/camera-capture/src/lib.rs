//! Camera Capture for the Drowsiness Monitor
//!
//! Owns everything between the camera and the consumers of frames:
//! - Frame sources (physical camera, image replay, synthetic pattern)
//! - Startup probing over a prioritized candidate list
//! - The background acquisition loop with bounded retry
//! - A single-slot, drop-oldest mailbox holding the latest frame

pub mod backend;
pub mod buffer;
pub mod capture;
pub mod frame;
pub mod probe;
pub mod source;

pub use buffer::FrameBuffer;
pub use capture::{
    CaptureConfig, CaptureExit, CaptureHandle, CaptureService, CaptureStatus, RetryPolicy, StopFlag,
};
pub use frame::Frame;
pub use probe::probe_candidates;
pub use source::{FrameSource, SourceDescriptor, SourceOpener, SourceSettings};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No capture device available: {0}")]
    DeviceUnavailable(String),

    #[error("Frame read timed out")]
    ReadTimeout,

    #[error("Capture device lost: {0}")]
    DeviceLost(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Camera not initialized")]
    NotInitialized,
}

impl CameraError {
    /// Whether the error means the device itself went away rather than a
    /// single read misfiring
    pub fn is_device_lost(&self) -> bool {
        matches!(self, CameraError::DeviceLost(_))
    }
}

#[cfg(test)]
mod testing;
