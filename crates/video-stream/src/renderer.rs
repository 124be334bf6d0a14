//! Frame annotation, downsampling, encoding and pacing

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camera_capture::{Frame, FrameBuffer, StopFlag};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::overlay::{annotate, OverlayMode, OverlaySource};
use crate::StreamError;

/// Stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound on emitted frames per second
    pub max_fps: u32,
    /// Output width after downsampling
    pub width: u32,
    /// Output height after downsampling
    pub height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Pause while waiting for a frame or for the next slot (milliseconds)
    pub idle_poll_ms: u64,
    pub overlay: OverlayMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_fps: 15,
            width: 480,
            height: 360,
            jpeg_quality: 50,
            idle_poll_ms: 10,
            overlay: OverlayMode::Latest,
        }
    }
}

impl StreamConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps.max(1) as f64)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}

/// Turns the latest buffered frame into annotated JPEG images
///
/// Never touches detection state; it only reads the frame buffer and the
/// overlay source.
#[derive(Clone)]
pub struct StreamRenderer {
    config: StreamConfig,
    buffer: Arc<FrameBuffer>,
    overlay: Arc<dyn OverlaySource>,
}

impl StreamRenderer {
    pub fn new(config: StreamConfig, buffer: Arc<FrameBuffer>, overlay: Arc<dyn OverlaySource>) -> Self {
        Self {
            config,
            buffer,
            overlay,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Annotate, downsample and encode one frame
    pub fn render(&self, frame: &Frame) -> Result<Vec<u8>, StreamError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(StreamError::InvalidFrame("empty frame".into()));
        }

        let mut image = frame.to_image();
        if let Some(detection) = self.overlay.detection(frame) {
            annotate(&mut image, &detection);
        }

        let (width, height) = (self.config.width.max(1), self.config.height.max(1));
        let image = if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        };

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.config.jpeg_quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|e| StreamError::Encode(e.to_string()))?;

        metrics::counter!("stream_frames_encoded_total").increment(1);
        Ok(jpeg)
    }

    /// The latest frame as a single JPEG, `None` before the first frame
    pub fn render_latest(&self) -> Result<Option<Vec<u8>>, StreamError> {
        match self.buffer.try_read() {
            Some(frame) => self.render(&frame).map(Some),
            None => Ok(None),
        }
    }

    /// Blocking, paced sequence of encoded frames that ends on `stop`
    pub fn frames(&self, stop: StopFlag) -> RenderLoop {
        RenderLoop {
            renderer: self.clone(),
            stop,
            last_emit: None,
        }
    }
}

/// Iterator yielding at most `max_fps` JPEG images per second
///
/// Waits while the buffer is empty; a failed encode is logged and skipped.
pub struct RenderLoop {
    renderer: StreamRenderer,
    stop: StopFlag,
    last_emit: Option<Instant>,
}

impl Iterator for RenderLoop {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let interval = self.renderer.config.frame_interval();
        let idle = self.renderer.config.idle_poll();

        loop {
            if self.stop.is_stopped() {
                return None;
            }

            if let Some(last) = self.last_emit {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    thread::sleep((interval - elapsed).min(idle));
                    continue;
                }
            }

            let Some(frame) = self.renderer.buffer.try_read() else {
                thread::sleep(idle);
                continue;
            };

            match self.renderer.render(&frame) {
                Ok(jpeg) => {
                    self.last_emit = Some(Instant::now());
                    return Some(jpeg);
                }
                Err(e) => {
                    warn!("Skipping stream frame: {}", e);
                    thread::sleep(idle);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::NoOverlay;
    use dms::{BoundingBox, DetectionResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOverlay(DetectionResult);

    impl OverlaySource for FixedOverlay {
        fn detection(&self, _frame: &Frame) -> Option<DetectionResult> {
            Some(self.0.clone())
        }
    }

    /// Counts how often the renderer asked for an overlay
    #[derive(Default)]
    struct CountingOverlay(AtomicUsize);

    impl OverlaySource for CountingOverlay {
        fn detection(&self, _frame: &Frame) -> Option<DetectionResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    /// Output wider than a JPEG can hold
    fn unencodable() -> StreamConfig {
        StreamConfig {
            width: 70_000,
            height: 1,
            idle_poll_ms: 1,
            ..Default::default()
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![90; (width * height * 3) as usize], width, height, 1).unwrap()
    }

    fn renderer(config: StreamConfig, buffer: Arc<FrameBuffer>) -> StreamRenderer {
        StreamRenderer::new(config, buffer, Arc::new(NoOverlay))
    }

    #[test]
    fn test_render_downsamples_to_jpeg() {
        let renderer = renderer(StreamConfig::default(), Arc::new(FrameBuffer::new()));
        let jpeg = renderer.render(&frame(640, 480)).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (480, 360));
    }

    #[test]
    fn test_render_with_overlay() {
        let overlay = FixedOverlay(DetectionResult::unresolved(BoundingBox::new(100, 100, 200, 200)));
        let renderer = StreamRenderer::new(
            StreamConfig::default(),
            Arc::new(FrameBuffer::new()),
            Arc::new(overlay),
        );
        assert!(renderer.render(&frame(640, 480)).is_ok());
    }

    #[test]
    fn test_render_latest_empty_buffer() {
        let buffer = Arc::new(FrameBuffer::new());
        let renderer = renderer(StreamConfig::default(), buffer.clone());
        assert!(renderer.render_latest().unwrap().is_none());

        buffer.publish(frame(64, 48));
        assert!(renderer.render_latest().unwrap().is_some());
    }

    #[test]
    fn test_loop_is_rate_limited() {
        let buffer = Arc::new(FrameBuffer::new());
        buffer.publish(frame(32, 24));
        let config = StreamConfig {
            max_fps: 20,
            width: 32,
            height: 24,
            idle_poll_ms: 1,
            ..Default::default()
        };
        let renderer = renderer(config, buffer);

        let started = Instant::now();
        let count = renderer.frames(StopFlag::new()).take(5).count();
        assert_eq!(count, 5);
        // 4 full intervals of 50 ms between the 5 frames
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_loop_waits_for_first_frame_and_honours_stop() {
        let buffer = Arc::new(FrameBuffer::new());
        let stop = StopFlag::new();
        let mut frames = renderer(StreamConfig::default(), buffer.clone()).frames(stop.clone());

        let publisher = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                buffer.publish(frame(48, 36));
            })
        };
        assert!(frames.next().is_some());
        publisher.join().unwrap();

        stop.stop();
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_oversized_output_is_an_encode_error() {
        let renderer = renderer(unencodable(), Arc::new(FrameBuffer::new()));
        assert!(matches!(renderer.render(&frame(4, 4)), Err(StreamError::Encode(_))));
    }

    #[test]
    fn test_loop_skips_failed_encodes() {
        let buffer = Arc::new(FrameBuffer::new());
        buffer.publish(frame(4, 4));
        let overlay = Arc::new(CountingOverlay::default());
        let stop = StopFlag::new();
        let frames = StreamRenderer::new(unencodable(), buffer, overlay.clone()).frames(stop.clone());

        let consumer = thread::spawn(move || frames.count());

        let deadline = Instant::now() + Duration::from_secs(5);
        while overlay.0.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "render loop stopped retrying");
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!consumer.is_finished());

        stop.stop();
        assert_eq!(consumer.join().unwrap(), 0);
    }
}
