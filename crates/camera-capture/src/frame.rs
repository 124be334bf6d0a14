//! Video frame type shared by the capture, detection and streaming paths

use std::time::{Duration, Instant};

use image::{ImageBuffer, Rgb, RgbImage};

use crate::CameraError;

/// Immutable RGB frame (height x width x 3, 8-bit channels)
///
/// Frames are never mutated after they leave the source; consumers that need
/// to draw on one work on their own converted copy.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: Instant,
    sequence: u64,
}

impl Frame {
    /// Create a frame from packed RGB bytes
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(CameraError::Format(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
            sequence,
        })
    }

    /// Create a frame from an RGB image buffer
    pub fn from_image(image: RgbImage, sequence: u64) -> Result<Self, CameraError> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, sequence)
    }

    /// Override the capture timestamp (sources that know the sensor time)
    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Re-tag the frame with the acquisition loop's sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Monotonic sequence number assigned by the acquisition loop
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time elapsed since capture
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Crop a region of the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<Frame> {
        let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).is_some_and(|end| end <= limit);
        if w == 0 || h == 0 || !fits(x, w, self.width) || !fits(y, h, self.height) {
            return None;
        }

        let row_bytes = w as usize * 3;
        let mut cropped = Vec::with_capacity(row_bytes * h as usize);
        for row in y..(y + h) {
            let start = (row as usize * self.width as usize + x as usize) * 3;
            let end = start + row_bytes;
            cropped.extend_from_slice(&self.data[start..end]);
        }

        Some(Frame {
            data: cropped,
            width: w,
            height: h,
            captured_at: self.captured_at,
            sequence: self.sequence,
        })
    }

    /// Copy the pixels into an owned image buffer for drawing/encoding
    pub fn to_image(&self) -> RgbImage {
        // Dimensions are validated at construction, so the buffer always fits
        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}
