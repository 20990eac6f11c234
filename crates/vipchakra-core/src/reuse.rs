//! Content-reuse detection by embedding similarity against caller history.

use crate::embedder::{EmbedderError, TextEmbedder};
use crate::types::{Embedding, ModelSlot, ReuseCheckResult, SimilarityOutcome};
use thiserror::Error;

/// Similarity above which new text counts as reused. Exclusive.
pub const REUSE_THRESHOLD: f32 = 0.7;

#[derive(Error, Debug)]
pub enum ReuseError {
    #[error("sentence embedding model is not loaded: {0}")]
    ModelUnavailable(String),
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),
}

/// Embeds text and flags it when it is too close to any previous embedding.
pub struct ReuseDetector {
    embedder: ModelSlot<Box<dyn TextEmbedder>>,
    threshold: f32,
}

impl ReuseDetector {
    pub fn new(embedder: ModelSlot<Box<dyn TextEmbedder>>, threshold: f32) -> Self {
        Self { embedder, threshold }
    }

    pub fn embedder(&self) -> &ModelSlot<Box<dyn TextEmbedder>> {
        &self.embedder
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embed `text` and compare it against `existing`.
    ///
    /// Only embedding can fail; comparison problems are reported in
    /// [`ReuseCheckResult::similarity`] with `is_reused = false`.
    pub fn check(&self, text: &str, existing: &[Vec<f32>]) -> Result<ReuseCheckResult, ReuseError> {
        let embedder = match &self.embedder {
            ModelSlot::Ready(embedder) => embedder,
            ModelSlot::Unavailable { reason } => return Err(ReuseError::ModelUnavailable(reason.clone())),
        };

        let embedding = embedder.embed(text)?;
        let similarity = compare_history(&embedding, existing);
        let is_reused = matches!(
            similarity,
            SimilarityOutcome::Compared { max_similarity } if max_similarity > self.threshold
        );

        match &similarity {
            SimilarityOutcome::Failed { reason } => {
                tracing::warn!(reason = %reason, history = existing.len(), "reuse comparison failed; treating as not reused");
            }
            SimilarityOutcome::Compared { max_similarity } => {
                tracing::debug!(max_similarity, history = existing.len(), is_reused, "reuse comparison complete");
            }
            SimilarityOutcome::Skipped => {}
        }

        Ok(ReuseCheckResult {
            is_reused,
            embedding,
            similarity,
        })
    }
}

/// Highest cosine similarity between `new` and any vector in `existing`.
///
/// A dimension mismatch anywhere fails the whole comparison. Non-finite
/// similarities (from overflowing history values) never count as a match
/// and are skipped.
pub fn compare_history(new: &Embedding, existing: &[Vec<f32>]) -> SimilarityOutcome {
    if existing.is_empty() {
        return SimilarityOutcome::Skipped;
    }

    let mut max_similarity = f32::NEG_INFINITY;
    let mut skipped = 0usize;
    for (i, previous) in existing.iter().enumerate() {
        let sim = match new.try_similarity(previous) {
            Ok(sim) => sim,
            Err(e) => {
                return SimilarityOutcome::Failed {
                    reason: format!("existing embedding {i}: {e}"),
                }
            }
        };
        if !sim.is_finite() {
            skipped += 1;
            continue;
        }
        max_similarity = max_similarity.max(sim);
    }

    if skipped > 0 {
        tracing::debug!(skipped, "ignored non-finite similarities");
    }
    SimilarityOutcome::Compared { max_similarity }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bag-of-words hashing embedder: identical texts embed identically.
    struct WordHashEmbedder;

    impl TextEmbedder for WordHashEmbedder {
        fn dimension(&self) -> usize {
            16
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
            let mut values = vec![0.0f32; 16];
            for word in text.split_whitespace() {
                let bucket = word.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
                values[bucket % 16] += 1.0;
            }
            Ok(Embedding::new(Embedding::l2_normalized(values)))
        }
    }

    /// Returns the same vector for every input.
    struct FixedEmbedder(Vec<f32>);

    impl TextEmbedder for FixedEmbedder {
        fn dimension(&self) -> usize {
            self.0.len()
        }

        fn embed(&self, _text: &str) -> Result<Embedding, EmbedderError> {
            Ok(Embedding::new(self.0.clone()))
        }
    }

    struct FailingEmbedder;

    impl TextEmbedder for FailingEmbedder {
        fn dimension(&self) -> usize {
            16
        }

        fn embed(&self, _text: &str) -> Result<Embedding, EmbedderError> {
            Err(EmbedderError::InferenceFailed("boom".into()))
        }
    }

    fn detector() -> ReuseDetector {
        ReuseDetector::new(ModelSlot::Ready(Box::new(WordHashEmbedder)), REUSE_THRESHOLD)
    }

    #[test]
    fn test_empty_history_is_not_reused() {
        let result = detector().check("hello world", &[]).unwrap();
        assert!(!result.is_reused);
        assert_eq!(result.similarity, SimilarityOutcome::Skipped);
        assert_eq!(result.embedding.dimension(), 16);
    }

    #[test]
    fn test_self_similarity_is_reused() {
        let d = detector();
        let first = d.check("hello world", &[]).unwrap();
        let second = d.check("hello world", &[first.embedding.values]).unwrap();
        assert!(second.is_reused);
        match second.similarity {
            SimilarityOutcome::Compared { max_similarity } => assert!((max_similarity - 1.0).abs() < 1e-5),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_any_match_flags_reuse() {
        let d = detector();
        let unrelated = vec![0.0f32; 16];
        let same = d.check("breaking news today", &[]).unwrap().embedding.values;
        let result = d.check("breaking news today", &[unrelated, same]).unwrap();
        assert!(result.is_reused);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        // A single word embeds one-hot, so self-similarity is exactly 1.0.
        let strict = ReuseDetector::new(ModelSlot::Ready(Box::new(WordHashEmbedder)), 1.0);
        let e = strict.check("alpha", &[]).unwrap().embedding;
        let result = strict.check("alpha", &[e.values]).unwrap();
        assert_eq!(result.similarity, SimilarityOutcome::Compared { max_similarity: 1.0 });
        assert!(!result.is_reused, "similarity equal to the threshold must not flag reuse");
    }

    #[test]
    fn test_below_threshold_not_reused() {
        let new = Embedding::new(vec![1.0, 0.0]);
        let history = vec![vec![0.0, 1.0], vec![0.5, 1.0]];
        let outcome = compare_history(&new, &history);
        let SimilarityOutcome::Compared { max_similarity } = outcome else {
            panic!("expected comparison");
        };
        assert!(max_similarity < REUSE_THRESHOLD);
    }

    #[test]
    fn test_dimension_mismatch_is_soft_failure() {
        let d = detector();
        let result = d.check("hello world", &[vec![1.0, 0.0, 0.0]]).unwrap();
        assert!(!result.is_reused);
        assert!(matches!(result.similarity, SimilarityOutcome::Failed { .. }));
        assert_eq!(result.embedding.dimension(), 16);
    }

    #[test]
    fn test_mismatch_anywhere_fails_whole_comparison() {
        let d = detector();
        let same = d.check("hello world", &[]).unwrap().embedding.values;
        let result = d.check("hello world", &[same, vec![1.0]]).unwrap();
        assert!(!result.is_reused);
        assert!(matches!(result.similarity, SimilarityOutcome::Failed { .. }));
    }

    #[test]
    fn test_non_finite_history_never_matches() {
        let new = Embedding::new(vec![1.0, 0.0]);
        let outcome = compare_history(&new, &[vec![f32::NAN, 1.0]]);
        let SimilarityOutcome::Compared { max_similarity } = outcome else {
            panic!("expected comparison, got {outcome:?}");
        };
        assert!(max_similarity <= REUSE_THRESHOLD);
    }

    #[test]
    fn test_overflowing_history_does_not_hide_match() {
        let d = ReuseDetector::new(ModelSlot::Ready(Box::new(FixedEmbedder(vec![1.0, 0.0]))), REUSE_THRESHOLD);
        // 1e39 overflows f32 when decoded from JSON
        let history: Vec<Vec<f32>> = serde_json::from_str("[[1e39, 0.0], [1.0, 0.0]]").unwrap();
        assert!(history[0][0].is_infinite());

        let result = d.check("anything", &history).unwrap();
        assert!(result.is_reused);
        assert_eq!(result.similarity, SimilarityOutcome::Compared { max_similarity: 1.0 });
    }

    #[test]
    fn test_similarity_exactly_at_default_threshold_is_not_reused() {
        // |[7, 7, 1, 1]| = 10, so the cosine against a unit axis is 7 / 10.
        let d = ReuseDetector::new(
            ModelSlot::Ready(Box::new(FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0]))),
            REUSE_THRESHOLD,
        );
        let result = d.check("anything", &[vec![7.0, 7.0, 1.0, 1.0]]).unwrap();
        assert_eq!(result.similarity, SimilarityOutcome::Compared { max_similarity: 0.7f32 });
        assert!(!result.is_reused);

        let above = d.check("anything", &[vec![7.5, 7.0, 1.0, 1.0]]).unwrap();
        assert!(above.is_reused);
    }

    #[test]
    fn test_unavailable_model_is_hard_error() {
        let d = ReuseDetector::new(ModelSlot::unavailable("missing onnx file"), REUSE_THRESHOLD);
        let err = d.check("hello world", &[]).unwrap_err();
        assert!(matches!(err, ReuseError::ModelUnavailable(ref r) if r == "missing onnx file"));
    }

    #[test]
    fn test_embedding_failure_propagates() {
        let d = ReuseDetector::new(ModelSlot::Ready(Box::new(FailingEmbedder)), REUSE_THRESHOLD);
        assert!(matches!(d.check("x", &[]), Err(ReuseError::Embedding(_))));
    }
}
