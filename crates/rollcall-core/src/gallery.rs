//! Known-face gallery: one reference embedding per enrolled identity.

use crate::engine::FaceEngine;
use crate::types::{Embedding, Identity};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference image extensions accepted by [`Gallery::load`] (case-insensitive).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read gallery directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One enrolled identity.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub identity: Identity,
    pub embedding: Embedding,
    /// Reference image the embedding was computed from.
    pub source: PathBuf,
}

/// Enrolled identities in load order. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<Enrollment>,
}

impl Gallery {
    /// Enroll every reference image in `dir`.
    ///
    /// Files are visited in sorted name order. A file that cannot be decoded
    /// or has no detectable face is skipped with a warning; only an unreadable
    /// directory fails the load.
    pub fn load(dir: &Path, engine: &mut dyn FaceEngine) -> Result<Self, GalleryError> {
        tracing::info!(dir = %dir.display(), "loading known faces");

        let dir_error = |source: std::io::Error| GalleryError::ReadDir { path: dir.to_path_buf(), source };
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(dir_error)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        let mut gallery = Gallery::default();
        for path in paths {
            let Some(identity) = identity_from_path(&path) else {
                tracing::warn!(path = %path.display(), "skipping file without a usable name");
                continue;
            };

            if gallery.get(&identity).is_some() {
                tracing::warn!(%identity, path = %path.display(), "duplicate identity, keeping first reference image");
                continue;
            }

            match enroll_file(&path, engine) {
                Ok(embedding) => {
                    tracing::info!(%identity, "loaded face data");
                    gallery.entries.push(Enrollment { identity, embedding, source: path });
                }
                Err(reason) => {
                    tracing::warn!(%identity, path = %path.display(), %reason, "failed to load reference face");
                }
            }
        }

        tracing::info!(identities = gallery.len(), "gallery ready");
        Ok(gallery)
    }

    /// Build a gallery from already-computed embeddings.
    pub fn from_entries(entries: Vec<Enrollment>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Enrollment> {
        self.entries.iter()
    }

    pub fn get(&self, identity: &Identity) -> Option<&Enrollment> {
        self.entries.iter().find(|e| &e.identity == identity)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter().map(|e| &e.identity)
    }
}

fn enroll_file(path: &Path, engine: &mut dyn FaceEngine) -> Result<Embedding, String> {
    let image = image::open(path).map_err(|e| format!("decode failed: {e}"))?.to_luma8();
    engine.represent(&image).map_err(|e| e.to_string())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// The file stem, trimmed. `None` for non UTF-8 or blank stems.
fn identity_from_path(path: &Path) -> Option<Identity> {
    let stem = path.file_stem()?.to_str()?.trim();
    (!stem.is_empty()).then(|| Identity::new(stem))
}
