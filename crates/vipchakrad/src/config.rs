use std::path::PathBuf;
use std::time::Duration;

use vipchakra_core::annotate::PREVIEW_CHARS;
use vipchakra_core::gallery::MATCH_THRESHOLD;
use vipchakra_core::reuse::REUSE_THRESHOLD;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:8001).
    pub bind_addr: String,
    /// Directory containing ONNX model files and the tokenizer.
    pub model_dir: PathBuf,
    /// Root of the VIP reference image gallery.
    pub gallery_dir: PathBuf,
    /// Cosine similarity above which text counts as reused.
    pub reuse_threshold: f32,
    /// Cosine distance at or below which a face matches a VIP.
    pub match_threshold: f32,
    /// Length of the hex preview of the annotated image.
    pub preview_chars: usize,
    /// Upload size limit for image analysis, in MiB.
    pub max_upload_mb: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// TrueType/OpenType font for box labels. The built-in bitmap font is used when unset.
    pub label_font: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `VIPCHAKRA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("VIPCHAKRA_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_model_dir(&var));

        Self {
            bind_addr: var("VIPCHAKRA_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8001".to_string()),
            model_dir,
            gallery_dir: var("VIPCHAKRA_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("vip_db")),
            reuse_threshold: parsed(&var, "VIPCHAKRA_REUSE_THRESHOLD", REUSE_THRESHOLD),
            match_threshold: parsed(&var, "VIPCHAKRA_MATCH_THRESHOLD", MATCH_THRESHOLD),
            preview_chars: parsed(&var, "VIPCHAKRA_PREVIEW_CHARS", PREVIEW_CHARS),
            max_upload_mb: parsed(&var, "VIPCHAKRA_MAX_UPLOAD_MB", 16),
            request_timeout_secs: parsed(&var, "VIPCHAKRA_REQUEST_TIMEOUT_SECS", 60),
            label_font: var("VIPCHAKRA_LABEL_FONT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    /// Path to the sentence embedding model.
    pub fn embedder_model_path(&self) -> PathBuf {
        self.model_dir.join("all-MiniLM-L6-v2.onnx")
    }

    /// Path to the sentence embedding tokenizer.
    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_model_dir(var: &impl Fn(&str) -> Option<String>) -> PathBuf {
    var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vipchakra/models")
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
