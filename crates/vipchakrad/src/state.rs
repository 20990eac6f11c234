//! Process-wide models, loaded once at startup.

use crate::config::Config;
use std::collections::BTreeMap;
use std::sync::Arc;
use vipchakra_core::annotate::{self, LabelFont};
use vipchakra_core::detector::{FaceDetect, FaceDetector};
use vipchakra_core::embedder::{OnnxTextEmbedder, TextEmbedder};
use vipchakra_core::gallery::{GalleryMatcher, IdentityGallery, IdentityMatcher};
use vipchakra_core::recognizer::FaceRecognizer;
use vipchakra_core::{ImageAnalyzer, ModelSlot, ReuseDetector};

/// Shared, read-only service state.
pub struct AppState {
    pub config: Config,
    pub reuse: ReuseDetector,
    pub analyzer: ImageAnalyzer,
    /// Gallery identities and their reference entry counts.
    pub gallery: BTreeMap<String, usize>,
}

impl AppState {
    pub fn new(config: Config, reuse: ReuseDetector, analyzer: ImageAnalyzer, gallery: BTreeMap<String, usize>) -> Self {
        Self {
            config,
            reuse,
            analyzer,
            gallery,
        }
    }

    /// Load every model named by `config`. Never fails: a model that cannot
    /// be loaded leaves its capability unavailable for the process lifetime.
    pub fn load(config: Config) -> Self {
        let reuse = load_reuse_detector(&config);
        let (analyzer, gallery) = load_image_analyzer(&config);
        Self::new(config, reuse, analyzer, gallery)
    }

    /// True when every capability loaded.
    pub fn is_ready(&self) -> bool {
        self.reuse.embedder().is_ready() && self.analyzer.detector().is_ready() && self.analyzer.matcher().is_ready()
    }
}

/// Load the sentence embedding model behind a reuse detector.
pub fn load_reuse_detector(config: &Config) -> ReuseDetector {
    let embedder = ModelSlot::from_result(
        OnnxTextEmbedder::load(&config.embedder_model_path(), &config.tokenizer_path())
            .map(|e| Box::new(e) as Box<dyn TextEmbedder>),
    );
    log_slot("embedder", &embedder);
    ReuseDetector::new(embedder, config.reuse_threshold)
}

/// Load the face models and build the VIP gallery.
///
/// Returns the analyzer and the gallery's identity counts.
pub fn load_image_analyzer(config: &Config) -> (ImageAnalyzer, BTreeMap<String, usize>) {
    let detector = ModelSlot::from_result(FaceDetector::load(&config.scrfd_model_path()));
    log_slot("detector", &detector);
    let recognizer = ModelSlot::from_result(FaceRecognizer::load(&config.arcface_model_path()).map(Arc::new));
    log_slot("recognizer", &recognizer);

    let mut identities = BTreeMap::new();
    let matcher: ModelSlot<Box<dyn IdentityMatcher>> = match (&detector, &recognizer) {
        (ModelSlot::Ready(detector), ModelSlot::Ready(recognizer)) => {
            match IdentityGallery::build(&config.gallery_dir, detector, &**recognizer) {
                Ok(gallery) => {
                    identities = gallery.identities();
                    ModelSlot::Ready(Box::new(GalleryMatcher::new(
                        recognizer.clone(),
                        gallery,
                        config.match_threshold,
                    )))
                }
                Err(e) => ModelSlot::unavailable(format!("gallery: {e}")),
            }
        }
        (_, ModelSlot::Unavailable { reason }) => ModelSlot::unavailable(reason.clone()),
        (ModelSlot::Unavailable { reason }, _) => {
            ModelSlot::unavailable(format!("gallery needs the face detector: {reason}"))
        }
    };
    log_slot("matcher", &matcher);

    let detector: ModelSlot<Box<dyn FaceDetect>> = match detector {
        ModelSlot::Ready(d) => ModelSlot::Ready(Box::new(d)),
        ModelSlot::Unavailable { reason } => ModelSlot::Unavailable { reason },
    };

    let font = match config.label_font.as_deref().map(annotate::load_font) {
        Some(Ok(font)) => LabelFont::Outline(font),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "label font unavailable, using the built-in bitmap font");
            LabelFont::Bitmap
        }
        None => LabelFont::Bitmap,
    };

    let analyzer = ImageAnalyzer::new(detector, matcher)
        .with_font(font)
        .with_preview_chars(config.preview_chars);
    (analyzer, identities)
}

fn log_slot<T>(name: &str, slot: &ModelSlot<T>) {
    match slot {
        ModelSlot::Ready(_) => tracing::info!(model = name, "model ready"),
        ModelSlot::Unavailable { reason } => tracing::warn!(model = name, %reason, "model unavailable"),
    }
}
