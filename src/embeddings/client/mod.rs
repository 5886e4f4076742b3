
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::embeddings::chunking::DocumentChunk;
use crate::llm::ApiTransport;

/// Embedding generation against an OpenAI-compatible `embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    transport: ApiTransport,
    model: String,
    batch_size: u32,
    expected_dimension: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let transport = ApiTransport::new(config)?;

        Ok(Self {
            transport,
            model: config.embedding_model.clone(),
            batch_size: config.batch_size.max(1),
            expected_dimension: config.embedding_dimension,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.transport = self.transport.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// List the models the server exposes under `GET models`
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response_text = self
            .transport
            .get("models")
            .context("Failed to fetch models")?;

        let models: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models.data.len());
        Ok(models.data)
    }

    /// Check that the server answers and serves the configured embedding model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let models = self.list_models().context("Server ping failed")?;

        if models.iter().any(|m| m.id == self.model) {
            info!(
                "Health check passed for {} with model {}",
                self.transport.base_url(),
                self.model
            );
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(anyhow::anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available
            ))
        }
    }

    /// Embed a single search query
    #[inline]
    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .context("Embedding response contained no vectors")
    }

    /// Embed texts in batches of `batch_size`, preserving input order
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let embeddings = self
                .embed_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    /// Embed the content of each chunk
    #[inline]
    pub fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        self.embed_texts(&texts)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response_text = self
            .transport
            .post_json("embeddings", &request)
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        response.data.sort_by_key(|item| item.index);

        let embeddings: Vec<Vec<f32>> = response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect();

        if let Some(first) = embeddings.first() {
            if embeddings.iter().any(|e| e.len() != first.len()) {
                return Err(anyhow::anyhow!(
                    "Embedding response mixes vector dimensions"
                ));
            }
            if first.len() != self.expected_dimension as usize {
                warn!(
                    "Model {} returned {}-dimensional vectors, configured dimension is {}",
                    self.model,
                    first.len(),
                    self.expected_dimension
                );
            }
        }

        Ok(embeddings)
    }
}
