//! Live Video Stream
//!
//! Read-only consumer of the frame buffer: draws the latest detection
//! geometry, downsamples, JPEG-encodes and paces frames for a motion-JPEG
//! transport.

pub mod multipart;
pub mod overlay;
pub mod renderer;

pub use overlay::{ClassifierOverlay, NoOverlay, OverlayMode, OverlaySource};
pub use renderer::{RenderLoop, StreamConfig, StreamRenderer};

use thiserror::Error;

/// Stream error types
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("JPEG encoding failed: {0}")]
    Encode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}
