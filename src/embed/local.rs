//! Local in-process embedding via fastembed.
//!
//! Model weights load lazily on first use and are memoized for the
//! lifetime of the embedder. Inference runs on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{l2_normalize, Embedder, EmbeddingBatch};
use crate::config::EmbeddingsConfig;
use crate::error::IndexError;

pub struct LocalEmbedder {
    model_name: String,
    batch_size: usize,
    model: OnceCell<Arc<TextEmbedding>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingsConfig) -> Self {
        Self {
            model_name: config.model.clone(),
            batch_size: config.batch_size.max(1),
            model: OnceCell::new(),
        }
    }

    fn parse_model_name(name: &str) -> EmbeddingModel {
        match name {
            "nomic-embed-text-v1.5" | "nomic-embed-text" | "nomic-ai/nomic-embed-text-v1.5" => {
                EmbeddingModel::NomicEmbedTextV15
            }
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" | "bge-small" | "BAAI/bge-small-en-v1.5" => {
                EmbeddingModel::BGESmallENV15
            }
            "bge-base-en-v1.5" | "bge-base" | "BAAI/bge-base-en-v1.5" => {
                EmbeddingModel::BGEBaseENV15
            }
            _ => {
                warn!("Unknown local model '{}', using all-MiniLM-L6-v2", name);
                EmbeddingModel::AllMiniLML6V2
            }
        }
    }

    fn model_dimension(name: &str) -> usize {
        match name {
            n if n.contains("bge-small") => 384,
            n if n.contains("bge-base") => 768,
            n if n.contains("nomic") => 768,
            n if n.contains("MiniLM") || n.contains("minilm") => 384,
            _ => 384,
        }
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, IndexError> {
        self.model
            .get_or_try_init(|| async {
                let name = self.model_name.clone();
                info!(model = %name, "Loading local embedding model");
                let model = tokio::task::spawn_blocking(move || {
                    let model_type = Self::parse_model_name(&name);
                    TextEmbedding::try_new(
                        InitOptions::new(model_type).with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| IndexError::EmbeddingModel(e.to_string()))?
                .map_err(|e| IndexError::EmbeddingModel(e.to_string()))?;
                info!("Local embedding model loaded");
                Ok(Arc::new(model))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, IndexError> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::default());
        }

        let model = self.model().await?;
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        let mut vectors = tokio::task::spawn_blocking(move || {
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                let batch: Vec<&str> = chunk.iter().map(|s| s.as_str()).collect();
                let embedded = model
                    .embed(batch, None)
                    .map_err(|e| IndexError::EmbeddingModel(e.to_string()))?;
                out.extend(embedded);
            }
            Ok::<Vec<Vec<f32>>, IndexError>(out)
        })
        .await
        .map_err(|e| IndexError::EmbeddingModel(e.to_string()))??;

        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Ok(EmbeddingBatch::from_vectors(vectors))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }

    fn dimension(&self) -> usize {
        Self::model_dimension(&self.model_name)
    }
}
