//! Remote embedding API provider.
//!
//! One request per bounded batch, each under its own timeout, with a
//! short exponential backoff on transport failures. Returned vectors
//! are re-normalized client-side before use.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{CreateEmbeddingRequestArgs, CreateEmbeddingResponse};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{l2_normalize, Embedder, EmbeddingBatch};
use crate::config::EmbeddingsConfig;
use crate::error::IndexError;

const MAX_RETRIES: usize = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
// Upstream API cap on inputs per request
const MAX_API_BATCH: usize = 2048;

#[derive(Debug)]
pub struct RemoteEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    batch_size: usize,
    timeout: Duration,
}

impl RemoteEmbedder {
    /// Fails fast when credentials are missing: selecting the remote
    /// provider without a key is misconfiguration, not a transient
    /// condition.
    pub fn new(config: &EmbeddingsConfig) -> Result<Self, IndexError> {
        let api_key = config
            .load_api_key()
            .map_err(|e| IndexError::EmbeddingConfig {
                provider: "remote",
                reason: e.to_string(),
            })?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            batch_size: config.batch_size.clamp(1, MAX_API_BATCH),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn model_dimension(model: &str) -> usize {
        match model {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(batch.to_vec())
            .build()
            .map_err(|e| IndexError::EmbeddingCall {
                status: "request_build".to_string(),
                body: e.to_string(),
            })?;

        let embeddings = self.client.embeddings();
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 0;
        let response = loop {
            match tokio::time::timeout(self.timeout, embeddings.create(request.clone())).await {
                Ok(Ok(response)) => break response,
                Ok(Err(error)) => {
                    if !is_retryable(&error) || attempt >= MAX_RETRIES {
                        return Err(map_api_error(error));
                    }
                    warn!(attempt, "Embedding request failed: {}", error);
                }
                Err(_) => {
                    if attempt >= MAX_RETRIES {
                        return Err(IndexError::EmbeddingCall {
                            status: "timeout".to_string(),
                            body: format!("no response within {:?}", self.timeout),
                        });
                    }
                    warn!(attempt, "Embedding request timed out");
                }
            }
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff *= 2;
            attempt += 1;
        };

        collect_vectors(response, batch.len())
    }
}

/// Map response items back to input slots by index. The API may
/// reorder items; it must not omit any — a short response would
/// otherwise leave empty vectors that misalign every following row
/// in the store.
fn collect_vectors(
    response: CreateEmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, IndexError> {
    let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); expected];
    let mut filled = vec![false; expected];
    for item in response.data {
        let slot = item.index as usize;
        if slot < expected {
            vectors[slot] = item.embedding;
            filled[slot] = true;
        }
    }

    let missing = filled.iter().filter(|f| !**f).count();
    if missing > 0 {
        return Err(IndexError::EmbeddingCall {
            status: "incomplete_response".to_string(),
            body: format!("{} of {} inputs missing from response", missing, expected),
        });
    }

    for vector in &mut vectors {
        l2_normalize(vector);
    }
    Ok(vectors)
}

/// Only transport failures are worth retrying. An API-level error
/// (bad key, malformed request) fails the same way every time, except
/// rate limiting and upstream server errors.
fn is_retryable(error: &OpenAIError) -> bool {
    match error {
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(api) => matches!(
            api.r#type.as_deref(),
            Some("server_error") | Some("rate_limit_exceeded")
        ),
        _ => false,
    }
}

fn map_api_error(error: OpenAIError) -> IndexError {
    match error {
        OpenAIError::ApiError(api) => IndexError::EmbeddingCall {
            status: api.r#type.unwrap_or_else(|| "api_error".to_string()),
            body: api.message,
        },
        other => IndexError::EmbeddingCall {
            status: "transport".to_string(),
            body: other.to_string(),
        },
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, IndexError> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::default());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(batch_len = batch.len(), model = %self.model, "Embedding batch");
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(EmbeddingBatch::from_vectors(vectors))
    }

    fn provider_name(&self) -> &'static str {
        "remote"
    }

    fn dimension(&self) -> usize {
        Self::model_dimension(&self.model)
    }
}
