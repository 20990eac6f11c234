use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer corner coordinates `(x1, y1, x2, y2)`, truncated toward zero.
    pub fn corners(&self) -> PixelBox {
        PixelBox {
            x1: self.x as i32,
            y1: self.y as i32,
            x2: (self.x + self.width) as i32,
            y2: (self.y + self.height) as i32,
        }
    }
}

/// Integer pixel box as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    /// Crop rectangle `(x, y, width, height)` clamped to a `width`×`height` image.
    ///
    /// Returns `None` when the clamped region has zero area.
    pub fn clamped_region(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: i32, max: u32| v.clamp(0, max as i32) as u32;
        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<[i32; 4]> for PixelBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<PixelBox> for [i32; 4] {
    fn from(b: PixelBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("embedding dimension mismatch: {left} vs {right}")]
pub struct DimensionMismatch {
    pub left: usize,
    pub right: usize,
}

/// Embedding vector produced by a text or face model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zip semantics: a
    /// length difference is silently ignored, use [`try_similarity`](Self::try_similarity)
    /// where dimensions are not known to agree.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        cosine(&self.values, &other.values)
    }

    /// Cosine similarity against a raw vector, rejecting dimension mismatches.
    pub fn try_similarity(&self, other: &[f32]) -> Result<f32, DimensionMismatch> {
        if self.values.len() != other.len() {
            return Err(DimensionMismatch {
                left: self.values.len(),
                right: other.len(),
            });
        }
        Ok(cosine(&self.values, other))
    }

    /// Cosine distance `1 - similarity`, in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }

    /// Scale to unit L2 norm. Zero vectors are returned unchanged.
    pub fn l2_normalized(values: Vec<f32>) -> Vec<f32> {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}

/// A loaded model, or the reason it could not be loaded.
///
/// Loading happens once at startup. An `Unavailable` slot stays unavailable
/// for the lifetime of the process.
#[derive(Debug)]
pub enum ModelSlot<T> {
    Ready(T),
    Unavailable { reason: String },
}

impl<T> ModelSlot<T> {
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(model) => ModelSlot::Ready(model),
            Err(e) => ModelSlot::Unavailable { reason: e.to_string() },
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ModelSlot::Unavailable { reason: reason.into() }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ModelSlot::Ready(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            ModelSlot::Ready(model) => Some(model),
            ModelSlot::Unavailable { .. } => None,
        }
    }

    /// Short status string for readiness reporting.
    pub fn status(&self) -> String {
        match self {
            ModelSlot::Ready(_) => "ready".to_string(),
            ModelSlot::Unavailable { reason } => format!("unavailable: {reason}"),
        }
    }
}

/// How the reuse comparison against caller history went.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityOutcome {
    /// Every existing embedding was compared.
    Compared { max_similarity: f32 },
    /// No history was supplied.
    Skipped,
    /// Comparison could not be performed; the reuse flag defaults to false.
    Failed { reason: String },
}

/// Result of a text reuse check.
#[derive(Debug, Clone)]
pub struct ReuseCheckResult {
    pub is_reused: bool,
    pub embedding: Embedding,
    pub similarity: SimilarityOutcome,
}

/// A gallery identity matched against a query face.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMatch {
    pub identity: String,
    /// Cosine distance to the closest reference embedding.
    pub distance: f32,
}

/// Outcome of matching one face crop against the identity gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(IdentityMatch),
    NoMatch,
    /// Matcher or gallery not loaded, or gallery empty.
    Unavailable,
    Error { reason: String },
}

impl MatchOutcome {
    pub fn identity(&self) -> Option<&IdentityMatch> {
        match self {
            MatchOutcome::Matched(m) => Some(m),
            _ => None,
        }
    }
}

/// One detected face as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct FaceDetection {
    pub bbox: PixelBox,
    pub recognized_vip: Option<String>,
    pub distance: Option<f32>,
    #[serde(skip)]
    pub outcome: MatchOutcome,
}

impl FaceDetection {
    pub fn new(bbox: PixelBox, outcome: MatchOutcome) -> Self {
        let (recognized_vip, distance) = match outcome.identity() {
            Some(m) => (Some(m.identity.clone()), Some(m.distance)),
            None => (None, None),
        };
        Self {
            bbox,
            recognized_vip,
            distance,
            outcome,
        }
    }

    /// Text drawn next to the box on the annotated image.
    pub fn label(&self) -> &str {
        self.recognized_vip.as_deref().unwrap_or("Unknown")
    }
}

/// An element of the `faces` list: a detection, or the in-band marker that
/// face detection failed for the whole image.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FaceEntry {
    Face(FaceDetection),
    Error { error: String },
}

impl FaceEntry {
    pub fn as_face(&self) -> Option<&FaceDetection> {
        match self {
            FaceEntry::Face(face) => Some(face),
            FaceEntry::Error { .. } => None,
        }
    }
}

/// Result of analyzing one uploaded image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageAnalysisResult {
    pub phash: String,
    pub faces: Vec<FaceEntry>,
    /// Hex encoding of the annotated JPEG, truncated to the preview length.
    pub annotated_image: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
        assert!((a.cosine_distance(&b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_try_similarity_rejects_mismatch() {
        let a = emb(&[1.0, 0.0, 0.0]);
        let err = a.try_similarity(&[1.0, 0.0]).unwrap_err();
        assert_eq!(err, DimensionMismatch { left: 3, right: 2 });
    }

    #[test]
    fn test_l2_normalized() {
        let v = Embedding::l2_normalized(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(Embedding::l2_normalized(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_corners_truncate() {
        let b = BoundingBox {
            x: 10.9, y: 20.2, width: 30.5, height: 40.0,
            confidence: 0.9, landmarks: None,
        };
        assert_eq!(b.corners(), PixelBox { x1: 10, y1: 20, x2: 41, y2: 60 });
    }

    #[test]
    fn test_clamped_region() {
        let b = PixelBox { x1: -5, y1: 10, x2: 50, y2: 200 };
        assert_eq!(b.clamped_region(40, 100), Some((0, 10, 40, 90)));

        let degenerate = PixelBox { x1: 10, y1: 10, x2: 10, y2: 30 };
        assert_eq!(degenerate.clamped_region(100, 100), None);

        let outside = PixelBox { x1: 120, y1: 10, x2: 150, y2: 30 };
        assert_eq!(outside.clamped_region(100, 100), None);
    }

    #[test]
    fn test_face_entry_serialization() {
        let matched = FaceDetection::new(
            PixelBox { x1: 1, y1: 2, x2: 3, y2: 4 },
            MatchOutcome::Matched(IdentityMatch { identity: "alice".into(), distance: 0.25 }),
        );
        let unknown = FaceDetection::new(
            PixelBox { x1: 5, y1: 6, x2: 7, y2: 8 },
            MatchOutcome::Error { reason: "boom".into() },
        );
        let json = serde_json::to_value(vec![
            FaceEntry::Face(matched),
            FaceEntry::Face(unknown),
            FaceEntry::Error { error: "face detection failed: x".into() },
        ])
        .unwrap();

        assert_eq!(json[0]["bbox"], serde_json::json!([1, 2, 3, 4]));
        assert_eq!(json[0]["recognized_vip"], "alice");
        assert_eq!(json[0]["distance"], 0.25);
        assert!(json[1]["recognized_vip"].is_null());
        assert!(json[1]["distance"].is_null());
        assert!(json[1].get("outcome").is_none());
        assert_eq!(json[2], serde_json::json!({ "error": "face detection failed: x" }));
    }

    #[test]
    fn test_label_defaults_to_unknown() {
        let face = FaceDetection::new(PixelBox { x1: 0, y1: 0, x2: 1, y2: 1 }, MatchOutcome::NoMatch);
        assert_eq!(face.label(), "Unknown");
    }

    #[test]
    fn test_model_slot_status() {
        let ready: ModelSlot<u8> = ModelSlot::Ready(1);
        assert!(ready.is_ready());
        assert_eq!(ready.status(), "ready");

        let missing: ModelSlot<u8> = ModelSlot::from_result(Err::<u8, _>("no file"));
        assert!(!missing.is_ready());
        assert!(missing.get().is_none());
        assert_eq!(missing.status(), "unavailable: no file");
    }
}
