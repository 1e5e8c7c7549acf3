//! Deterministic fallback embedding.
//!
//! Byte histogram over the UTF-8 encoding, L2-normalized. Not
//! semantically meaningful; it keeps the pipeline operable offline
//! and makes tests reproducible without model downloads.

use async_trait::async_trait;

use super::{l2_normalize, Embedder, EmbeddingBatch};
use crate::error::IndexError;

pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for byte in text.as_bytes() {
            vector[*byte as usize % self.dim] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, IndexError> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::default());
        }
        let vectors = texts.iter().map(|t| self.embed_one(t)).collect();
        Ok(EmbeddingBatch::from_vectors(vectors))
    }

    fn provider_name(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed(&["fn main() {}".to_string()]).await.unwrap();
        let b = embedder.embed(&["fn main() {}".to_string()]).await.unwrap();
        assert_eq!(a.vectors, b.vectors);
        assert_eq!(a.dim, 64);
    }

    #[tokio::test]
    async fn test_normalized() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder
            .embed(&["some text to embed".to_string()])
            .await
            .unwrap();
        let norm: f32 = batch.vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_input_short_circuits() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed(&[]).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.dim, 0);
    }

    #[tokio::test]
    async fn test_empty_text_yields_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let batch = embedder.embed(&[String::new()]).await.unwrap();
        assert_eq!(batch.vectors[0], vec![0.0; 16]);
    }

    #[tokio::test]
    async fn test_distinct_texts_distinct_vectors() {
        let embedder = HashEmbedder::new(64);
        let batch = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_ne!(batch.vectors[0], batch.vectors[1]);
    }
}
