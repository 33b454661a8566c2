use crate::embeddings::Embedder;
use crate::error::{DocragError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request structure for OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

/// Response structure from OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Handles batch embedding generation with retry logic and rate limiting.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    batch_size: usize,
    dimensions: usize,
    max_retries: usize,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder.
    ///
    /// `batch_size` is the maximum number of texts sent per API request
    /// (capped at the API limit of 2048).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// normal operation).
    pub fn new(api_key: String, model: String, batch_size: usize, dimensions: usize) -> Self {
        let batch_size = batch_size.min(2048);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model,
            batch_size,
            dimensions,
            max_retries: 3,
        }
    }

    /// Make a single API request for one batch of texts.
    async fn request_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DocragError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(DocragError::Embedding(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DocragError::Embedding(format!("Failed to parse response: {}", e)))?;

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Request one batch with retry on transient failures.
    ///
    /// Retries on 429 and 5xx with exponential backoff; other errors return
    /// immediately.
    async fn request_batch_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request_batch(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if attempt < self.max_retries => {
                    let msg = e.to_string();
                    let should_retry = msg.contains("429")
                        || msg.contains("500")
                        || msg.contains("502")
                        || msg.contains("503")
                        || msg.contains("504")
                        || msg.contains("Network error");

                    if should_retry {
                        log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        attempt += 1;
                    } else {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a batch of texts, automatically splitting into smaller batches
    /// if needed. Returns one embedding per input text, in order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.request_batch_with_retry(chunk.to_vec()).await?;

            if embeddings.len() != chunk.len() {
                return Err(DocragError::Embedding(format!(
                    "Embedding count mismatch: sent {}, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }

            for embedding in &embeddings {
                if embedding.len() != self.dimensions {
                    return Err(DocragError::Embedding(format!(
                        "Unexpected embedding dimension: expected {}, got {}",
                        self.dimensions,
                        embedding.len()
                    )));
                }
            }

            all_embeddings.extend(embeddings);

            // Small pause between full batches to stay under rate limits
            if chunk.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_new() {
        let embedder = OpenAIEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            100,
            1536,
        );

        assert_eq!(embedder.model, "text-embedding-3-small");
        assert_eq!(embedder.batch_size, 100);
        assert_eq!(embedder.dimensions(), 1536);
    }

    #[test]
    fn test_embedder_batch_size_limit() {
        // Batch size is capped at the API limit of 2048
        let embedder = OpenAIEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            5000,
            1536,
        );

        assert_eq!(embedder.batch_size, 2048);
    }

    #[tokio::test]
    async fn test_embed_batch_empty() {
        let embedder = OpenAIEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            100,
            1536,
        );

        // Empty input short-circuits without touching the network
        let embeddings = embedder.embed_batch(Vec::new()).await.unwrap();
        assert!(embeddings.is_empty());
    }

    // Integration tests for actual API calls would require a real API key
    // and are run separately.
}
