//! Semantic similarity adapters
//!
//! Similarity is optional. [`NoSimilarity`] is the null object used when no
//! embedding model is configured, and any adapter error counts as zero.

use crate::error::AdapterError;
use crate::metrics::METRICS;
use moka::sync::Cache;
use std::sync::Arc;
use tracing::debug;

/// Pairwise similarity between two texts, in [-1, 1]
pub trait SimilarityScorer: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> Result<f32, AdapterError>;

    /// Similarity clamped to [-1, 1], or 0 when the adapter fails
    fn similarity_or_zero(&self, a: &str, b: &str) -> f64 {
        match self.similarity(a, b) {
            Ok(score) if score.is_finite() => f64::from(score.clamp(-1.0, 1.0)),
            Ok(_) => 0.0,
            Err(e) => {
                debug!("Similarity unavailable, scoring as 0: {}", e);
                METRICS.record_adapter_fallback("similarity");
                0.0
            }
        }
    }
}

/// Null similarity: always zero
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSimilarity;

impl SimilarityScorer for NoSimilarity {
    fn similarity(&self, _a: &str, _b: &str) -> Result<f32, AdapterError> {
        Ok(0.0)
    }

    fn similarity_or_zero(&self, _a: &str, _b: &str) -> f64 {
        0.0
    }
}

/// Produces an embedding vector for a text
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError>;
}

/// Cosine similarity over embeddings, with a bounded embedding cache
pub struct EmbeddingSimilarity {
    embedder: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl EmbeddingSimilarity {
    /// Default number of cached embeddings
    pub const DEFAULT_CACHE_SIZE: u64 = 2048;

    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_cache_size(embedder, Self::DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(embedder: Arc<dyn Embedder>, max_entries: u64) -> Self {
        Self {
            embedder,
            cache: Cache::new(max_entries),
        }
    }

    fn embedding(&self, text: &str) -> Result<Arc<Vec<f32>>, AdapterError> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let vector = Arc::new(self.embedder.embed(text)?);
        self.cache.insert(text.to_string(), vector.clone());
        Ok(vector)
    }
}

impl SimilarityScorer for EmbeddingSimilarity {
    fn similarity(&self, a: &str, b: &str) -> Result<f32, AdapterError> {
        let va = self.embedding(a)?;
        let vb = self.embedding(b)?;
        cosine_similarity(&va, &vb)
    }
}

/// Cosine similarity of two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, AdapterError> {
    if a.len() != b.len() {
        return Err(AdapterError::Failed(format!(
            "embedding dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}
