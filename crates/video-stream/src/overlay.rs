//! Detection geometry drawn on streamed frames

use std::sync::Arc;

use camera_capture::Frame;
use dms::{BoundingBox, DetectionResult, MonitorShared, SharedClassifier};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::debug;

const FACE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const EYE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const ESTIMATED_EYE_COLOR: Rgb<u8> = Rgb([255, 128, 128]);

/// Upper part of the face searched for eyes
const EYE_BAND: f32 = 0.6;

/// Where overlay geometry comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Reuse the detection loop's last classification
    #[default]
    Latest,
    /// Classify every streamed frame through the shared classifier
    Classify,
    /// Plain video
    None,
}

/// Supplies the detection drawn on a frame
pub trait OverlaySource: Send + Sync {
    fn detection(&self, frame: &Frame) -> Option<DetectionResult>;
}

pub struct NoOverlay;

impl OverlaySource for NoOverlay {
    fn detection(&self, _frame: &Frame) -> Option<DetectionResult> {
        None
    }
}

impl OverlaySource for MonitorShared {
    fn detection(&self, _frame: &Frame) -> Option<DetectionResult> {
        self.latest_detection()
    }
}

/// Fresh classification per frame, sharing the detection loop's model lock
pub struct ClassifierOverlay {
    classifier: SharedClassifier,
    shared: Arc<MonitorShared>,
}

impl ClassifierOverlay {
    pub fn new(classifier: SharedClassifier, shared: Arc<MonitorShared>) -> Self {
        Self { classifier, shared }
    }
}

impl OverlaySource for ClassifierOverlay {
    fn detection(&self, frame: &Frame) -> Option<DetectionResult> {
        let threshold = self.shared.settings().confidence_threshold;
        match self.classifier.classify(frame, threshold) {
            Ok(classification) => Some(classification.result),
            Err(e) => {
                debug!("Overlay classification skipped: {}", e);
                None
            }
        }
    }
}

/// Eye boxes to draw: the two largest detected, or estimated positions
///
/// Returns the boxes and whether they are estimates.
pub fn eye_regions(face: &BoundingBox, eyes: &[BoundingBox]) -> (Vec<BoundingBox>, bool) {
    if !eyes.is_empty() {
        let mut largest = eyes.to_vec();
        largest.sort_by_key(|eye| std::cmp::Reverse(eye.area()));
        largest.truncate(2);
        return (largest, false);
    }

    let (w, h) = (face.width as f32, face.height as f32);
    let eye_w = (w * 0.25) as u32;
    let eye_h = (h * 0.15) as u32;
    let eye_y = face.y + (h * EYE_BAND * 0.4) as u32;
    let left = BoundingBox::new(face.x + (w * 0.2) as u32, eye_y, eye_w, eye_h);
    let right = BoundingBox::new(face.x + (w * 0.55) as u32, eye_y, eye_w, eye_h);
    (vec![left, right], true)
}

/// 2 px outline, clipped to the image
fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let Some(bbox) = bbox.clamp_to(image.width(), image.height()) else {
        return;
    };
    draw_hollow_rect_mut(
        image,
        Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width, bbox.height),
        color,
    );
    if bbox.width > 2 && bbox.height > 2 {
        draw_hollow_rect_mut(
            image,
            Rect::at(bbox.x as i32 + 1, bbox.y as i32 + 1).of_size(bbox.width - 2, bbox.height - 2),
            color,
        );
    }
}

/// Draw face and eye boxes in place
pub fn annotate(image: &mut RgbImage, detection: &DetectionResult) {
    let Some(face) = detection.face_box.filter(|_| detection.face_found) else {
        return;
    };
    draw_box(image, &face, FACE_COLOR);

    let (eyes, estimated) = eye_regions(&face, &detection.eyes);
    let color = if estimated { ESTIMATED_EYE_COLOR } else { EYE_COLOR };
    for eye in &eyes {
        draw_box(image, eye, color);
    }
}
