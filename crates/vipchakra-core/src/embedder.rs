//! Sentence embeddings via ONNX Runtime.
//!
//! Runs a sentence-transformer encoder (all-MiniLM-L6-v2 exported to ONNX)
//! with a HuggingFace `tokenizer.json`, mean-pools the token states over the
//! attention mask and L2-normalizes the result.

use crate::types::Embedding;
use ndarray::Array2;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tokenizers::{Tokenizer, TruncationParams};

const MINILM_MAX_TOKENS: usize = 256;
const MINILM_MODEL_VERSION: &str = "all-MiniLM-L6-v2";
const SAMPLE_TEXT: &str = "dimension check";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("tokenizer: {0}")]
    Tokenizer(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that maps text to a fixed-dimension embedding.
pub trait TextEmbedder: Send + Sync {
    /// Output dimensionality; every embedding this model produces has it.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Embedding, EmbedderError>;
}

/// ONNX sentence-transformer encoder.
pub struct OnnxTextEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    wants_token_type_ids: bool,
    dimension: usize,
}

impl OnnxTextEmbedder {
    /// Load the encoder and its tokenizer, then measure the output dimension.
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self, EmbedderError> {
        for path in [model_path, tokenizer_path] {
            if !path.exists() {
                return Err(EmbedderError::ModelNotFound(path.display().to_string()));
            }
        }

        let mut tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;
        limit_sequence_length(&mut tokenizer)?;

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let input_names: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let wants_token_type_ids = input_names.iter().any(|n| n == "token_type_ids");

        tracing::info!(
            path = %model_path.display(),
            inputs = ?input_names,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded sentence embedding model"
        );

        let mut embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            wants_token_type_ids,
            dimension: 0,
        };
        embedder.dimension = embedder.run(SAMPLE_TEXT)?.len();
        if embedder.dimension == 0 {
            return Err(EmbedderError::InferenceFailed("model produced an empty embedding".into()));
        }
        tracing::info!(dimension = embedder.dimension, "sentence embedding dimension measured");

        Ok(embedder)
    }

    fn run(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&x| x as i64).collect();
        let seq_len = ids.len();

        let to_array = |v: Vec<i64>| {
            Array2::from_shape_vec((1, seq_len), v).map_err(|e| EmbedderError::InferenceFailed(e.to_string()))
        };
        let input_ids = to_array(ids)?;
        let attention_mask = to_array(mask.clone())?;
        let token_type_ids = Array2::<i64>::zeros((1, seq_len));

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbedderError::InferenceFailed("embedding session lock poisoned".into()))?;
        let outputs = if self.wants_token_type_ids {
            session.run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(input_ids.view())?,
                "attention_mask" => TensorRef::from_array_view(attention_mask.view())?,
                "token_type_ids" => TensorRef::from_array_view(token_type_ids.view())?,
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(input_ids.view())?,
                "attention_mask" => TensorRef::from_array_view(attention_mask.view())?,
            ])?
        };

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("hidden state extraction: {e}")))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        match dims.as_slice() {
            // Already pooled: [batch, hidden]
            [1, _] => Ok(Embedding::l2_normalized(data.to_vec())),
            // Token states: [batch, seq, hidden]
            [1, seq, hidden] => Ok(Embedding::l2_normalized(mean_pool(data, *seq, *hidden, &mask))),
            other => Err(EmbedderError::InferenceFailed(format!(
                "unexpected output shape {other:?}"
            ))),
        }
    }
}

impl TextEmbedder for OnnxTextEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
        let values = self.run(text)?;
        if values.len() != self.dimension {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {}-dim embedding, got {}",
                self.dimension,
                values.len()
            )));
        }
        Ok(Embedding {
            values,
            model_version: Some(MINILM_MODEL_VERSION.to_string()),
        })
    }
}

/// Truncate encodings to the model's sequence limit. The tokenizer reserves
/// room for the special tokens its post-processor adds, so `[SEP]` survives.
fn limit_sequence_length(tokenizer: &mut Tokenizer) -> Result<(), EmbedderError> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MINILM_MAX_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;
    Ok(())
}

/// Average token states `[seq, hidden]` over positions whose mask is set.
fn mean_pool(states: &[f32], seq_len: usize, hidden: usize, mask: &[i64]) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut count = 0usize;

    for (t, row) in states.chunks(hidden).take(seq_len).enumerate() {
        if mask.get(t).copied().unwrap_or(0) == 0 {
            continue;
        }
        count += 1;
        for (acc, &v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
    }

    if count > 0 {
        let n = count as f32;
        pooled.iter_mut().for_each(|v| *v /= n);
    }
    pooled
}
