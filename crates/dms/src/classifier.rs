//! Eye/face classifier contract

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camera_capture::Frame;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersection with a `width` x `height` frame, `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        (w > 0 && h > 0).then(|| Self::new(self.x, self.y, w, h))
    }
}

/// Outcome of classifying one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub face_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_box: Option<BoundingBox>,
    /// Eye regions in frame coordinates, may be empty even with a face
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eyes: Vec<BoundingBox>,
    /// `None` when a face was found but its eyes could not be resolved
    pub is_drowsy: Option<bool>,
    /// Model score in 0..1, higher means more alert
    pub confidence: Option<f32>,
}

impl DetectionResult {
    /// No face in the frame
    pub fn no_face() -> Self {
        Self::default()
    }

    /// Face found but no usable eye score
    pub fn unresolved(face_box: BoundingBox) -> Self {
        Self {
            face_found: true,
            face_box: Some(face_box),
            ..Default::default()
        }
    }

    /// Face with a model score; `confidence < threshold` is drowsy
    ///
    /// A non-finite score is treated as unresolved.
    pub fn scored(face_box: BoundingBox, confidence: f32, threshold: f32) -> Self {
        if !confidence.is_finite() {
            return Self::unresolved(face_box);
        }
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            face_found: true,
            face_box: Some(face_box),
            eyes: Vec::new(),
            is_drowsy: Some(confidence < threshold),
            confidence: Some(confidence),
        }
    }

    pub fn with_eyes(mut self, eyes: Vec<BoundingBox>) -> Self {
        self.eyes = eyes;
        self
    }

    /// True only for a face whose eyes were scored drowsy
    pub fn is_drowsy_observation(&self) -> bool {
        self.face_found && self.is_drowsy == Some(true)
    }
}

/// Classification plus the time spent inside the model
#[derive(Debug, Clone)]
pub struct Classification {
    pub result: DetectionResult,
    pub latency: Duration,
}

/// Per-frame face/eye classifier
///
/// Implementations may keep internal scratch state, hence `&mut self`; the
/// [`SharedClassifier`] wrapper serializes calls across threads.
pub trait Classifier: Send {
    fn name(&self) -> &str;

    /// Whether a model is actually loaded
    fn is_ready(&self) -> bool {
        true
    }

    fn classify(&mut self, frame: &Frame, threshold: f32) -> Result<DetectionResult, DmsError>;
}

/// Cloneable handle around one classifier instance
///
/// Holds the inference lock, which is separate from the frame buffer lock so
/// a slow inference never blocks frame publication.
#[derive(Clone)]
pub struct SharedClassifier {
    inner: Arc<Mutex<Box<dyn Classifier>>>,
    name: Arc<str>,
    ready: bool,
}

impl SharedClassifier {
    pub fn new(classifier: impl Classifier + 'static) -> Self {
        let name: Arc<str> = classifier.name().into();
        let ready = classifier.is_ready();
        Self {
            inner: Arc::new(Mutex::new(Box::new(classifier))),
            name,
            ready,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Run one inference, blocking while another caller holds the model
    pub fn classify(&self, frame: &Frame, threshold: f32) -> Result<Classification, DmsError> {
        let mut classifier = self
            .inner
            .lock()
            .map_err(|_| DmsError::Inference("classifier lock poisoned".into()))?;
        let started = Instant::now();
        let result = classifier.classify(frame, threshold)?;
        Ok(Classification {
            result,
            latency: started.elapsed(),
        })
    }
}

/// Stand-in used when no model is configured; never reports a face
#[derive(Debug, Default)]
pub struct NoModelClassifier;

impl Classifier for NoModelClassifier {
    fn name(&self) -> &str {
        "no-model"
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn classify(&mut self, _frame: &Frame, _threshold: f32) -> Result<DetectionResult, DmsError> {
        Ok(DetectionResult::no_face())
    }
}

#[cfg(feature = "onnx")]
pub mod onnx {
    //! ONNX eye-state model applied to a located face crop

    use std::path::Path;

    use camera_capture::Frame;
    use image::imageops::{self, FilterType};
    use ndarray::Array4;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use tracing::info;

    use super::{BoundingBox, Classifier, DetectionResult};
    use crate::DmsError;

    /// Finds the driver's face in a frame
    pub trait FaceLocator: Send {
        fn locate(&mut self, frame: &Frame) -> Option<BoundingBox>;
    }

    /// Fixed region for a cabin camera aimed at the driver's seat
    ///
    /// Fractions are of the frame size.
    #[derive(Debug, Clone, Copy)]
    pub struct CenterRegionLocator {
        pub x: f32,
        pub y: f32,
        pub width: f32,
        pub height: f32,
    }

    impl Default for CenterRegionLocator {
        fn default() -> Self {
            Self {
                x: 0.3,
                y: 0.2,
                width: 0.4,
                height: 0.5,
            }
        }
    }

    impl FaceLocator for CenterRegionLocator {
        fn locate(&mut self, frame: &Frame) -> Option<BoundingBox> {
            let (w, h) = (frame.width() as f32, frame.height() as f32);
            BoundingBox::new(
                (w * self.x) as u32,
                (h * self.y) as u32,
                (w * self.width) as u32,
                (h * self.height) as u32,
            )
            .clamp_to(frame.width(), frame.height())
        }
    }

    /// Binary eye-state model; output 0 is the probability of open eyes
    pub struct OnnxClassifier<L> {
        locator: L,
        session: Session,
        input_size: u32,
        name: String,
    }

    impl<L: FaceLocator> OnnxClassifier<L> {
        pub fn load(path: impl AsRef<Path>, input_size: u32, locator: L) -> Result<Self, DmsError> {
            let path = path.as_ref();
            info!("Loading eye-state model from {}", path.display());
            let session = Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.commit_from_file(path))
                .map_err(|e| DmsError::ModelLoad(e.to_string()))?;

            Ok(Self {
                locator,
                session,
                input_size: input_size.max(1),
                name: format!("onnx:{}", path.display()),
            })
        }

        fn score(&self, frame: &Frame, face: BoundingBox) -> Result<f32, DmsError> {
            let crop = frame
                .crop(face.x, face.y, face.width, face.height)
                .ok_or_else(|| DmsError::ImageProcessing("face crop outside frame".into()))?;
            let size = self.input_size;
            let resized = imageops::resize(&crop.to_image(), size, size, FilterType::Triangle);

            let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
                }
            }

            let inputs = ort::inputs![input].map_err(|e| DmsError::Inference(e.to_string()))?;
            let outputs = self
                .session
                .run(inputs)
                .map_err(|e| DmsError::Inference(e.to_string()))?;
            let scores = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| DmsError::Inference(e.to_string()))?;

            scores
                .iter()
                .next()
                .copied()
                .ok_or_else(|| DmsError::Inference("model returned an empty tensor".into()))
        }
    }

    impl<L: FaceLocator> Classifier for OnnxClassifier<L> {
        fn name(&self) -> &str {
            &self.name
        }

        fn classify(&mut self, frame: &Frame, threshold: f32) -> Result<DetectionResult, DmsError> {
            let Some(face) = self.locator.locate(frame) else {
                return Ok(DetectionResult::no_face());
            };
            let confidence = self.score(frame, face)?;
            Ok(DetectionResult::scored(face, confidence, threshold))
        }
    }
}
