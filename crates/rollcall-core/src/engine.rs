//! The detection + embedding seam the gallery and matcher are written against.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected")]
    NoFaceDetected,
}

/// Face detection and embedding, treated as a black box by the rest of the kiosk.
pub trait FaceEngine {
    /// Locate faces in `image`, highest confidence first.
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EngineError>;

    /// Compute the embedding of one detected face.
    fn embed(&mut self, image: &GrayImage, face: &BoundingBox) -> Result<Embedding, EngineError>;

    /// Detect with detection enforced: embed the most confident face, or fail
    /// with [`EngineError::NoFaceDetected`].
    fn represent(&mut self, image: &GrayImage) -> Result<Embedding, EngineError> {
        let faces = self.detect(image)?;
        let face = faces.first().ok_or(EngineError::NoFaceDetected)?;
        self.embed(image, face)
    }
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct OnnxEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEngine {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(&detector_model_path(model_dir))?;
        let recognizer = FaceRecognizer::load(&recognizer_model_path(model_dir))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEngine for OnnxEngine {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EngineError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &GrayImage, face: &BoundingBox) -> Result<Embedding, EngineError> {
        Ok(self.recognizer.extract(image, face)?)
    }
}

pub fn detector_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(DETECTOR_MODEL_FILE)
}

pub fn recognizer_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(RECOGNIZER_MODEL_FILE)
}

/// Model directory used when none is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

#[cfg(test)]
pub(crate) mod testing {
    //! A deterministic stand-in for the ONNX engine.
    //!
    //! Any non-black image contains one face covering its centre. The
    //! embedding is a one-hot vector picked by mean brightness, so a white
    //! crop and a white reference image always match each other.

    use super::*;

    #[derive(Default)]
    pub struct FakeEngine {
        pub detect_calls: usize,
        pub fail_detect: bool,
    }

    pub fn brightness(image: &GrayImage) -> f32 {
        let pixels = image.as_raw();
        if pixels.is_empty() {
            return 0.0;
        }
        pixels.iter().map(|&p| p as f32).sum::<f32>() / pixels.len() as f32
    }

    impl FaceEngine for FakeEngine {
        fn detect(&mut self, image: &GrayImage) -> Result<Vec<BoundingBox>, EngineError> {
            self.detect_calls += 1;
            if self.fail_detect {
                return Err(EngineError::Detector(DetectorError::InferenceFailed("fake".into())));
            }
            if brightness(image) < 1.0 {
                return Ok(Vec::new());
            }
            let (w, h) = image.dimensions();
            Ok(vec![BoundingBox {
                x: w as f32 * 0.25,
                y: h as f32 * 0.25,
                width: w as f32 * 0.5,
                height: h as f32 * 0.5,
                confidence: 0.99,
                landmarks: None,
            }])
        }

        fn embed(&mut self, image: &GrayImage, _face: &BoundingBox) -> Result<Embedding, EngineError> {
            let values = match brightness(image) {
                b if b >= 192.0 => vec![1.0, 0.0, 0.0],
                b if b >= 64.0 => vec![0.0, 1.0, 0.0],
                _ => vec![0.0, 0.0, 1.0],
            };
            Ok(Embedding::new(values))
        }
    }

    #[test]
    fn test_represent_enforces_detection() {
        let mut engine = FakeEngine::default();
        let black = GrayImage::new(32, 32);
        assert!(matches!(engine.represent(&black), Err(EngineError::NoFaceDetected)));
    }

    #[test]
    fn test_represent_embeds_first_face() {
        let mut engine = FakeEngine::default();
        let white = GrayImage::from_pixel(32, 32, image::Luma([255]));
        let embedding = engine.represent(&white).unwrap();
        assert_eq!(embedding.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_model_paths() {
        let dir = Path::new("/opt/models");
        assert_eq!(detector_model_path(dir), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(recognizer_model_path(dir), PathBuf::from("/opt/models/w600k_r50.onnx"));
    }
}
