//! vipchakra-core — inference pipelines for the VipChakra ML service.
//!
//! Text reuse detection over sentence embeddings, and image analysis:
//! SCRFD face detection, ArcFace identity matching against a VIP gallery,
//! perceptual hashing and annotated previews. Models run via ONNX Runtime
//! on the CPU.

pub mod alignment;
pub mod analyzer;
pub mod annotate;
pub mod detector;
pub mod embedder;
pub mod gallery;
pub mod phash;
pub mod recognizer;
pub mod reuse;
pub mod types;

pub use analyzer::{AnalyzeError, ImageAnalyzer};
pub use gallery::{GalleryMatcher, IdentityGallery, IdentityMatcher};
pub use reuse::{ReuseDetector, ReuseError};
pub use types::{
    BoundingBox, Embedding, FaceDetection, FaceEntry, ImageAnalysisResult, MatchOutcome, ModelSlot,
    ReuseCheckResult, SimilarityOutcome,
};
