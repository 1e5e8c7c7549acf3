//! Embedding dispatch over interchangeable providers.
//!
//! Three strategies behind one trait: a remote API, a local
//! in-process model, and a deterministic hash fallback that needs no
//! network and never fails. All providers return L2-normalized
//! vectors so cosine similarity downstream is well-defined.

mod hash;
mod local;
mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use hash::HashEmbedder;
pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;

use crate::config::EmbeddingsConfig;
use crate::error::IndexError;

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote embedding API (needs credentials)
    Remote,
    /// In-process feature-extraction model
    Local,
    /// Deterministic byte-histogram fallback, always operable
    #[default]
    Hash,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Remote => "remote",
            ProviderKind::Local => "local",
            ProviderKind::Hash => "hash",
        }
    }
}

/// Result of one embedding call: one vector per input text, in input
/// order. `dim` is 0 when no vectors were produced, which callers
/// treat as "no embeddings available", not as an error.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub dim: usize,
}

impl EmbeddingBatch {
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Self {
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        Self { vectors, dim }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Empty input must return an empty batch
    /// without touching the backend.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, IndexError>;

    /// Embed a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, IndexError> {
        let batch = self.embed(&[query.to_string()]).await?;
        Ok(batch.vectors.into_iter().next().unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str;

    fn dimension(&self) -> usize;
}

/// Build the configured provider. Missing credentials for an
/// explicitly selected provider is a hard configuration error raised
/// here, before any call is attempted.
pub fn create_embedder(config: &EmbeddingsConfig) -> Result<Box<dyn Embedder>, IndexError> {
    match config.provider {
        ProviderKind::Remote => Ok(Box::new(RemoteEmbedder::new(config)?)),
        ProviderKind::Local => Ok(Box::new(LocalEmbedder::new(config))),
        ProviderKind::Hash => Ok(Box::new(HashEmbedder::new(config.hash_dim))),
    }
}

/// Normalize in place. A zero vector is left untouched.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_default_is_hash() {
        assert_eq!(ProviderKind::default(), ProviderKind::Hash);
        assert_eq!(ProviderKind::Hash.as_str(), "hash");
    }

    #[test]
    fn test_batch_dim_zero_when_empty() {
        let batch = EmbeddingBatch::from_vectors(Vec::new());
        assert_eq!(batch.dim, 0);
        assert!(batch.is_empty());

        let batch = EmbeddingBatch::from_vectors(vec![vec![0.0; 8]]);
        assert_eq!(batch.dim, 8);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_create_embedder_defaults_to_hash() {
        let config = EmbeddingsConfig::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.provider_name(), "hash");
    }
}
