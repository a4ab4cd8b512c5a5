
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::{Embedder, check_vectors};
use crate::http::{HttpClient, join_url};
use crate::{Result, StemError};

/// HuggingFace Inference feature-extraction endpoint.
#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    client: HttpClient,
}

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

impl HuggingFaceEmbedder {
    #[inline]
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        dimension: usize,
        client: HttpClient,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            dimension,
            client,
        }
    }

    #[inline]
    pub fn from_config(config: &Config, client: HttpClient) -> Result<Self> {
        let api_key = config.huggingface.api_key.clone().ok_or_else(|| {
            StemError::Config("HUGGINGFACE_API_KEY is not configured".to_string())
        })?;

        Ok(Self::new(
            &config.huggingface.base_url,
            &config.embedding.model,
            Some(api_key),
            config.embedding.dimension as usize,
            client,
        ))
    }

    fn endpoint(&self) -> String {
        join_url(
            &self.base_url,
            &[&self.model, "pipeline", "feature-extraction"],
        )
    }

    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint();
        let body = serde_json::to_string(&FeatureExtractionRequest {
            inputs: texts,
            options: RequestOptions {
                wait_for_model: true,
            },
        })
        .map_err(|e| StemError::Embedding(format!("Failed to serialize request: {}", e)))?;

        debug!("Requesting {} embeddings from {}", texts.len(), self.model);

        let response = self
            .client
            .execute("huggingface feature-extraction", |agent| {
                let request = agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json");
                match &self.api_key {
                    Some(key) => request
                        .header("Authorization", &format!("Bearer {}", key))
                        .send(&body),
                    None => request.send(&body),
                }
            })
            .map_err(|e| StemError::Embedding(e.upstream_message()))?;

        let value: Value = response
            .json()
            .map_err(|e| StemError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        parse_feature_extraction(&value)
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_id(&self) -> &str {
        &self.model
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
        info!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(vectors)
    }
}

/// Decode a feature-extraction payload into one vector per input.
///
/// Sentence-transformer models answer with `[[f32; d]; n]`. Token-level models
/// answer with `[[[f32; d]; tokens]; n]`, which is mean-pooled per input.
#[inline]
pub fn parse_feature_extraction(value: &Value) -> Result<Vec<Vec<f32>>> {
    let rows = value.as_array().ok_or_else(|| {
        StemError::Embedding(format!("Unexpected embedding response: {}", truncate(value)))
    })?;

    rows.iter()
        .map(|row| match row {
            Value::Array(items) if items.iter().all(Value::is_number) => number_vector(items),
            Value::Array(tokens) if tokens.iter().all(Value::is_array) => {
                let vectors = tokens
                    .iter()
                    .map(|token| match token {
                        Value::Array(items) => number_vector(items),
                        _ => unexpected_shape(token),
                    })
                    .collect::<Result<Vec<_>>>()?;
                mean_pool(&vectors)
            }
            other => unexpected_shape(other),
        })
        .collect()
}

fn number_vector(items: &[Value]) -> Result<Vec<f32>> {
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| StemError::Embedding(format!("Non-numeric embedding value: {}", item)))
        })
        .collect()
}

fn mean_pool(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| StemError::Embedding("Empty token embedding list".to_string()))?;
    let mut pooled = vec![0.0f32; first.len()];

    for vector in vectors {
        if vector.len() != pooled.len() {
            return Err(StemError::Embedding(
                "Token embeddings have inconsistent dimensions".to_string(),
            ));
        }
        for (acc, v) in pooled.iter_mut().zip(vector) {
            *acc += v;
        }
    }

    let count = vectors.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= count);
    Ok(pooled)
}

fn unexpected_shape<T>(value: &Value) -> Result<T> {
    Err(StemError::Embedding(format!(
        "Unexpected embedding shape: {}",
        truncate(value)
    )))
}

fn truncate(value: &Value) -> String {
    let text = value.to_string();
    match text.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}
