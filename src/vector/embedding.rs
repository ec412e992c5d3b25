use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error};

use crate::vector::TARGET_VECTOR;
use crate::{RecommendError, Result};

/// Turns query texts into vectors in the same space as the indexed sentences.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embeds text through an Ollama server's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    ollama: Ollama,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(ollama: Ollama, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ollama,
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );

        let response = match timeout(self.timeout, self.ollama.generate_embeddings(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(target: TARGET_VECTOR, "Embedding request failed: {}", e);
                return Err(RecommendError::upstream("embedder", e));
            }
            Err(_) => {
                error!(target: TARGET_VECTOR, "Embedding request timed out after {:?}", self.timeout);
                return Err(RecommendError::upstream("embedder", "request timed out"));
            }
        };

        if response.embeddings.len() != texts.len() {
            return Err(RecommendError::upstream(
                "embedder",
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            ));
        }

        debug!(target: TARGET_VECTOR,
            "Embedded {} texts with {} in {:?}",
            texts.len(),
            self.model,
            start.elapsed()
        );

        Ok(response.embeddings)
    }
}
