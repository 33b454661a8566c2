//! Retrieval and grounded answering: embed the question, pull the
//! nearest chunks from the store, and hand them to a chat model as the
//! only context it may answer from.

use crate::cache::EmbeddingCache;
use crate::config::{GenerationConfig, RetrievalConfig};
use crate::embeddings::Embedder;
use crate::error::{DocragError, Result};
use crate::store::{ScoredChunk, VectorStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Answer generation seam, so retrieval logic is testable without a
/// network-backed model.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI chat completions client used to phrase grounded answers.
pub struct OpenAIGenerator {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAIGenerator {
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// normal operation).
    pub fn new(api_key: String, config: &GenerationConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| DocragError::Generation(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(DocragError::Generation(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| DocragError::Generation(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DocragError::Generation("Empty completion response".to_string()))
    }
}

/// A generated answer together with the chunks it was grounded on.
#[derive(Debug)]
pub struct GroundedAnswer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
}

/// Retriever over the vector store.
///
/// Embeds queries (consulting the embedding cache first), runs the
/// similarity search, and optionally drives a generator over the results.
pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    cache: Option<Arc<EmbeddingCache>>,
    default_k: usize,
    min_score: f32,
}

impl Retriever {
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            cache: None,
            default_k: config.default_k,
            min_score: config.min_score,
        }
    }

    /// Attach a query-embedding cache, so repeated questions skip the
    /// embeddings API.
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(vector) = cache.get(query) {
                log::debug!("Query embedding cache hit");
                return Ok(vector);
            }
        }

        let vector = self.embedder.embed(query).await?;

        if let Some(cache) = &self.cache {
            cache.put(query.to_string(), vector.clone());
        }

        Ok(vector)
    }

    /// Top-k similarity retrieval for a query, nearest first.
    ///
    /// `k` defaults from configuration when not given. An empty index, or a
    /// query where nothing clears the score floor, yields an empty list
    /// rather than an error.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DocragError::InvalidInput(
                "Query must not be empty".to_string(),
            ));
        }

        let k = k.unwrap_or(self.default_k);
        let vector = self.embed_query(query).await?;
        self.store.query(vector, k, self.min_score).await
    }

    /// Answer a question grounded in the retrieved chunks.
    ///
    /// When nothing is retrieved the generator is not called at all; the
    /// fixed no-context answer is returned with no sources.
    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<GroundedAnswer> {
        let sources = self.retrieve(question, k).await?;

        if sources.is_empty() {
            return Ok(GroundedAnswer {
                answer: "I don't know: no relevant documents were found.".to_string(),
                sources,
            });
        }

        let prompt = build_prompt(question, &sources);
        let answer = self.generator.generate(&prompt).await?;

        Ok(GroundedAnswer { answer, sources })
    }
}

/// Assemble the grounding prompt: retrieved chunks in rank order, each
/// labelled with its source document, then the question.
fn build_prompt(question: &str, sources: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for chunk in sources {
        context.push_str(&format!("[Source: {}]\n{}\n\n", chunk.file_name, chunk.text));
    }

    format!(
        "Use the following context to answer the question. \
         If the context does not contain the answer, say you don't know \
         instead of guessing.\n\n\
         Context:\n{}\
         Question: {}\n\n\
         Answer:",
        context, question
    )
}
