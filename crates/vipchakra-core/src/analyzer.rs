//! Image analysis pipeline: hash, detect, identify, annotate.

use crate::annotate::{self, AnnotateError, AnnotationPlan, LabelFont};
use crate::detector::FaceDetect;
use crate::gallery::IdentityMatcher;
use crate::phash::{self, PhashError};
use crate::types::{BoundingBox, FaceDetection, FaceEntry, ImageAnalysisResult, MatchOutcome, ModelSlot};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("perceptual hash: {0}")]
    Phash(#[from] PhashError),
    #[error("annotation: {0}")]
    Annotate(#[from] AnnotateError),
}

/// What the detection stage produced for a whole image.
#[derive(Debug)]
pub enum DetectionOutcome {
    Detected(Vec<BoundingBox>),
    Failed { reason: String },
}

/// Runs the image pipeline against the loaded detector and matcher.
pub struct ImageAnalyzer {
    detector: ModelSlot<Box<dyn FaceDetect>>,
    matcher: ModelSlot<Box<dyn IdentityMatcher>>,
    font: LabelFont,
    preview_chars: usize,
}

impl ImageAnalyzer {
    pub fn new(detector: ModelSlot<Box<dyn FaceDetect>>, matcher: ModelSlot<Box<dyn IdentityMatcher>>) -> Self {
        Self {
            detector,
            matcher,
            font: LabelFont::default(),
            preview_chars: annotate::PREVIEW_CHARS,
        }
    }

    pub fn with_font(mut self, font: LabelFont) -> Self {
        self.font = font;
        self
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn detector(&self) -> &ModelSlot<Box<dyn FaceDetect>> {
        &self.detector
    }

    pub fn matcher(&self) -> &ModelSlot<Box<dyn IdentityMatcher>> {
        &self.matcher
    }

    /// Decode `bytes` and analyze the image.
    pub fn analyze(&self, bytes: &[u8]) -> Result<ImageAnalysisResult, AnalyzeError> {
        let frame = decode(bytes)?;
        self.analyze_frame(&frame).map(|(result, _)| result)
    }

    /// Analyze a decoded frame. Also returns the fully annotated image.
    pub fn analyze_frame(&self, frame: &RgbImage) -> Result<(ImageAnalysisResult, RgbImage), AnalyzeError> {
        let phash = phash::perceptual_hash(frame)?;

        let mut plan = AnnotationPlan::new();
        let faces = match self.detect(frame) {
            DetectionOutcome::Detected(boxes) => {
                let total = boxes.len();
                let faces: Vec<FaceEntry> = boxes
                    .iter()
                    .filter_map(|face| self.describe_face(frame, face, &mut plan))
                    .map(FaceEntry::Face)
                    .collect();
                tracing::debug!(detected = total, reported = faces.len(), "faces analyzed");
                faces
            }
            DetectionOutcome::Failed { reason } => {
                tracing::warn!(%reason, "face detection failed");
                vec![FaceEntry::Error {
                    error: format!("face detection failed: {reason}"),
                }]
            }
        };

        let annotated = plan.apply(frame, &self.font);
        let annotated_image = annotate::encode_preview(&annotated, self.preview_chars)?;

        Ok((
            ImageAnalysisResult {
                phash,
                faces,
                annotated_image,
            },
            annotated,
        ))
    }

    fn detect(&self, frame: &RgbImage) -> DetectionOutcome {
        match &self.detector {
            ModelSlot::Ready(detector) => match detector.detect(frame) {
                Ok(boxes) => DetectionOutcome::Detected(boxes),
                Err(e) => DetectionOutcome::Failed { reason: e.to_string() },
            },
            ModelSlot::Unavailable { reason } => DetectionOutcome::Failed {
                reason: format!("detector unavailable: {reason}"),
            },
        }
    }

    /// Identify one face. `None` when its crop is empty.
    fn describe_face(&self, frame: &RgbImage, face: &BoundingBox, plan: &mut AnnotationPlan) -> Option<FaceDetection> {
        let bbox = face.corners();
        bbox.clamped_region(frame.width(), frame.height())?;

        let outcome = match &self.matcher {
            ModelSlot::Ready(matcher) => matcher.identify(frame, face),
            ModelSlot::Unavailable { .. } => MatchOutcome::Unavailable,
        };
        match &outcome {
            MatchOutcome::Matched(m) => {
                tracing::debug!(identity = %m.identity, distance = m.distance, "face matched");
            }
            MatchOutcome::Error { reason } => {
                tracing::warn!(?bbox, %reason, "identity match failed");
            }
            MatchOutcome::NoMatch | MatchOutcome::Unavailable => {}
        }

        let detection = FaceDetection::new(bbox, outcome);
        plan.push(bbox, detection.label());
        Some(detection)
    }
}

fn decode(bytes: &[u8]) -> Result<RgbImage, AnalyzeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| AnalyzeError::InvalidImage(e.to_string()))
}
