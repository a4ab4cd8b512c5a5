
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::{Embedder, check_vectors};
use crate::http::HttpClient;
use crate::{Result, StemError};

/// Local Ollama server, used both for embeddings and for tutoring text generation.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
    client: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    #[inline]
    pub fn new(
        config: &OllamaConfig,
        embedding_model: &str,
        dimension: usize,
        client: HttpClient,
    ) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| StemError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            embedding_model: embedding_model.to_string(),
            generation_model: config.generation_model.clone(),
            dimension,
            client,
        })
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StemError::Config(format!("Failed to build Ollama URL {}: {}", path, e)))
    }

    fn post_json<T: Serialize>(&self, what: &str, path: &str, payload: &T) -> Result<Vec<u8>> {
        let url = self.endpoint(path)?;
        let body = serde_json::to_string(payload)
            .map_err(|e| StemError::Network(format!("Failed to serialize {}: {}", what, e)))?;

        let response = self
            .client
            .execute(what, |agent| {
                agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&body)
            })
            .map_err(|e| StemError::Network(e.upstream_message()))?;

        Ok(response.body)
    }

    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(
            "Generating {} embeddings with Ollama model {}",
            texts.len(),
            self.embedding_model
        );

        let body = self
            .post_json(
                "ollama embed",
                "/api/embed",
                &EmbedRequest {
                    model: &self.embedding_model,
                    input: texts,
                },
            )
            .map_err(|e| match e {
                StemError::Network(message) => StemError::Embedding(message),
                other => other,
            })?;

        let parsed: EmbedResponse = serde_json::from_slice(&body)
            .map_err(|e| StemError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        Ok(parsed.embeddings)
    }

    /// Generate a completion for `prompt` with the configured generation model.
    #[inline]
    pub fn generate_blocking(&self, prompt: &str) -> Result<String> {
        debug!(
            "Generating completion with {} (prompt length: {})",
            self.generation_model,
            prompt.len()
        );

        let body = self.post_json(
            "ollama generate",
            "/api/generate",
            &GenerateRequest {
                model: &self.generation_model,
                prompt,
                stream: false,
            },
        )?;

        let parsed: GenerateResponse = serde_json::from_slice(&body)
            .map_err(|e| StemError::Network(format!("Failed to parse generate response: {}", e)))?;

        Ok(parsed.response)
    }

    #[inline]
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let this = self.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || this.generate_blocking(&prompt))
            .await
            .map_err(|e| StemError::Network(format!("Generation task failed: {}", e)))?
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let this = self.clone();
        let owned = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || this.embed_blocking(&owned))
            .await
            .map_err(|e| StemError::Embedding(format!("Embedding task failed: {}", e)))??;

        check_vectors(&vectors, texts.len(), self.dimension)?;
        info!("Embedded {} texts with {}", texts.len(), self.embedding_model);
        Ok(vectors)
    }
}
