//! Resolve a cropped face to a gallery identity.

use crate::engine::{EngineError, FaceEngine};
use crate::gallery::Gallery;
use crate::types::{Embedding, Identity};
use image::GrayImage;

/// Outcome of comparing a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Identity that verified, if any.
    pub identity: Option<Identity>,
    /// Similarity of the verified identity, or the best seen when nothing verified.
    pub similarity: f32,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;
}

/// Verifies identities in gallery order and stops at the first one whose
/// cosine similarity reaches the threshold. No ranking across identities.
#[derive(Debug, Clone, Copy)]
pub struct FirstMatch {
    pub threshold: f32,
}

impl FirstMatch {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Identify the face in a cropped region.
    ///
    /// Detection is re-run on the crop. A crop without a detectable face, or
    /// any engine error, yields `None` rather than an error.
    pub fn identify(
        &self,
        engine: &mut dyn FaceEngine,
        gallery: &Gallery,
        face: &GrayImage,
    ) -> Option<Identity> {
        let probe = match engine.represent(face) {
            Ok(probe) => probe,
            Err(EngineError::NoFaceDetected) => {
                tracing::debug!("no face in cropped region");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "face verification failed");
                return None;
            }
        };

        let result = self.compare(&probe, gallery);
        tracing::debug!(identity = ?result.identity, similarity = result.similarity, "compared probe");
        result.identity
    }
}

impl Matcher for FirstMatch {
    fn compare(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        let mut best = f32::NEG_INFINITY;

        for entry in gallery.iter() {
            let similarity = match probe.try_similarity(&entry.embedding) {
                Ok(similarity) => similarity,
                Err(err) => {
                    tracing::warn!(identity = %entry.identity, error = %err, "comparison failed, treating as non-match");
                    continue;
                }
            };

            if similarity >= self.threshold {
                return MatchResult {
                    identity: Some(entry.identity.clone()),
                    similarity,
                };
            }
            best = best.max(similarity);
        }

        MatchResult {
            identity: None,
            similarity: if best == f32::NEG_INFINITY { 0.0 } else { best },
        }
    }
}
