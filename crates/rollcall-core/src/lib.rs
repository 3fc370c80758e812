//! rollcall-core: face detection, recognition and gallery matching.
//!
//! Uses SCRFD for face detection and ArcFace for embeddings, both running via
//! ONNX Runtime on the CPU. The gallery and matcher only see the
//! [`FaceEngine`] trait, so they run against any detection backend.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use detector::FaceDetector;
pub use engine::{
    default_model_dir, detector_model_path, recognizer_model_path, EngineError, FaceEngine, OnnxEngine,
};
pub use gallery::{Enrollment, Gallery, GalleryError};
pub use matcher::{FirstMatch, MatchResult, Matcher};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, DimensionMismatch, Embedding, Identity, PixelRect};
