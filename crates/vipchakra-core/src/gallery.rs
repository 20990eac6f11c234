//! VIP identity gallery and face matching.
//!
//! The gallery is built once from reference images on disk. Identity labels
//! are assigned while building, either from an explicit `gallery.toml`
//! manifest or from the name of the directory holding each image, and stored
//! on every entry. Matching never looks at paths.

use crate::detector::FaceDetect;
use crate::recognizer::FaceEmbed;
use crate::types::{BoundingBox, Embedding, IdentityMatch, MatchOutcome};
use image::RgbImage;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "gallery.toml";

/// Cosine distance at or below which a face matches a gallery identity
/// (the usual ArcFace cosine verification threshold).
pub const MATCH_THRESHOLD: f32 = 0.68;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "gif"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    RootNotFound(String),
    #[error("failed to read gallery manifest {path}: {source}")]
    ManifestIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid gallery manifest {path}: {source}")]
    Manifest {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to scan gallery: {0}")]
    Walk(#[from] walkdir::Error),
}

/// `gallery.toml`:
///
/// ```toml
/// [[identity]]
/// name = "Jane Doe"
/// images = ["jane/1.jpg", "jane/2.jpg"]
/// ```
#[derive(Debug, Deserialize)]
struct GalleryManifest {
    #[serde(rename = "identity", default)]
    identities: Vec<ManifestIdentity>,
}

#[derive(Debug, Deserialize)]
struct ManifestIdentity {
    name: String,
    images: Vec<PathBuf>,
}

/// A reference image and the identity it depicts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub identity: String,
    pub path: PathBuf,
}

/// One enrolled reference face.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    pub source: PathBuf,
    pub embedding: Embedding,
}

/// List the reference images under `root` with their identities.
pub fn discover(root: &Path) -> Result<Vec<ReferenceImage>, GalleryError> {
    if !root.is_dir() {
        return Err(GalleryError::RootNotFound(root.display().to_string()));
    }

    let manifest_path = root.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        let display = manifest_path.display().to_string();
        let text = std::fs::read_to_string(&manifest_path).map_err(|source| GalleryError::ManifestIo {
            path: display.clone(),
            source,
        })?;
        let manifest: GalleryManifest =
            toml::from_str(&text).map_err(|source| GalleryError::Manifest { path: display, source })?;

        tracing::info!(identities = manifest.identities.len(), "using gallery manifest");
        return Ok(manifest
            .identities
            .into_iter()
            .flat_map(|identity| {
                let name = identity.name;
                identity.images.into_iter().map(move |image| ReferenceImage {
                    identity: name.clone(),
                    path: root.join(image),
                })
            })
            .collect());
    }

    // Directory layout: <root>/<identity>/<image>
    let mut references = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let identity = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        if let Some(identity) = identity {
            references.push(ReferenceImage {
                identity,
                path: entry.into_path(),
            });
        }
    }
    Ok(references)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Enrolled reference embeddings for every known identity.
#[derive(Debug, Clone, Default)]
pub struct IdentityGallery {
    entries: Vec<GalleryEntry>,
}

impl IdentityGallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// Discover reference images under `root` and enroll each one.
    ///
    /// Each image contributes the embedding of its most confident face, or of
    /// the whole image when no face is found. Images that cannot be read or
    /// embedded are skipped.
    pub fn build(root: &Path, detector: &dyn FaceDetect, recognizer: &dyn FaceEmbed) -> Result<Self, GalleryError> {
        let references = discover(root)?;
        let mut entries = Vec::with_capacity(references.len());

        for reference in references {
            match enroll(&reference, detector, recognizer) {
                Ok(embedding) => entries.push(GalleryEntry {
                    identity: reference.identity,
                    source: reference.path,
                    embedding,
                }),
                Err(reason) => {
                    tracing::warn!(
                        identity = %reference.identity,
                        path = %reference.path.display(),
                        %reason,
                        "skipping gallery image"
                    );
                }
            }
        }

        let gallery = Self { entries };
        tracing::info!(
            root = %root.display(),
            identities = gallery.identities().len(),
            entries = gallery.len(),
            "identity gallery built"
        );
        Ok(gallery)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identity names with their number of reference entries, sorted by name.
    pub fn identities(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.identity.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Closest entry to `query` by cosine distance, over the whole gallery.
    pub fn nearest(&self, query: &Embedding) -> Option<IdentityMatch> {
        self.entries
            .iter()
            .map(|entry| (entry, query.cosine_distance(&entry.embedding)))
            .filter(|(_, d)| d.is_finite())
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(entry, distance)| IdentityMatch {
                identity: entry.identity.clone(),
                distance,
            })
    }
}

fn enroll(reference: &ReferenceImage, detector: &dyn FaceDetect, recognizer: &dyn FaceEmbed) -> Result<Embedding, String> {
    let frame = image::open(&reference.path).map_err(|e| e.to_string())?.to_rgb8();
    let faces = detector.detect(&frame).map_err(|e| e.to_string())?;
    let face = faces.into_iter().next().unwrap_or_else(|| whole_frame(&frame));
    recognizer.embed_face(&frame, &face).map_err(|e| e.to_string())
}

fn whole_frame(frame: &RgbImage) -> BoundingBox {
    BoundingBox {
        x: 0.0,
        y: 0.0,
        width: frame.width() as f32,
        height: frame.height() as f32,
        confidence: 0.0,
        landmarks: None,
    }
}

/// Anything that can put a name to a detected face.
pub trait IdentityMatcher: Send + Sync {
    fn identify(&self, frame: &RgbImage, face: &BoundingBox) -> MatchOutcome;
}

/// Matches faces against an [`IdentityGallery`] by ArcFace cosine distance.
pub struct GalleryMatcher {
    recognizer: Arc<dyn FaceEmbed>,
    gallery: IdentityGallery,
    threshold: f32,
}

impl GalleryMatcher {
    pub fn new(recognizer: Arc<dyn FaceEmbed>, gallery: IdentityGallery, threshold: f32) -> Self {
        Self {
            recognizer,
            gallery,
            threshold,
        }
    }

    pub fn gallery(&self) -> &IdentityGallery {
        &self.gallery
    }
}

impl IdentityMatcher for GalleryMatcher {
    fn identify(&self, frame: &RgbImage, face: &BoundingBox) -> MatchOutcome {
        if self.gallery.is_empty() {
            return MatchOutcome::Unavailable;
        }

        let query = match self.recognizer.embed_face(frame, face) {
            Ok(query) => query,
            Err(e) => return MatchOutcome::Error { reason: e.to_string() },
        };

        match self.gallery.nearest(&query) {
            Some(best) if best.distance <= self.threshold => MatchOutcome::Matched(best),
            Some(_) => MatchOutcome::NoMatch,
            None => MatchOutcome::Error {
                reason: "no comparable gallery embedding".into(),
            },
        }
    }
}
