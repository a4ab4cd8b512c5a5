//! Pinecone data-plane client (upsert, query, delete) over its REST API.


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::database::vector::{EmbeddingRecord, SearchHit, VectorStore};
use crate::http::{HttpClient, join_url};
use crate::{Result, StemError};

const API_VERSION: &str = "2024-07";
const TEXT_KEY: &str = "text";

#[derive(Debug, Clone)]
pub struct PineconeStore {
    host: String,
    index_name: String,
    api_key: String,
    batch_size: usize,
    client: HttpClient,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    delete_all: bool,
    namespace: &'a str,
}

impl PineconeStore {
    /// `host` is the index's data-plane host, with or without a scheme.
    #[inline]
    pub fn new(
        host: &str,
        index_name: &str,
        api_key: &str,
        batch_size: usize,
        client: HttpClient,
    ) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        Self {
            host,
            index_name: index_name.to_string(),
            api_key: api_key.to_string(),
            batch_size: batch_size.max(1),
            client,
        }
    }

    #[inline]
    pub fn from_config(config: &Config, client: HttpClient) -> Result<Self> {
        let api_key = config
            .vector_store
            .api_key
            .as_deref()
            .ok_or_else(|| StemError::Config("PINECONE_API_KEY is not configured".to_string()))?;
        let host = config.vector_store.index_host.as_deref().ok_or_else(|| {
            StemError::Config(format!(
                "PINECONE_HOST is not configured for index {}",
                config.vector_store.index_name
            ))
        })?;

        Ok(Self::new(
            host,
            &config.vector_store.index_name,
            api_key,
            config.vector_store.upsert_batch_size as usize,
            client,
        ))
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn post(&self, what: &str, path: &str, body: &str) -> Result<Vec<u8>> {
        let url = join_url(&self.host, &[path]);

        let response = self
            .client
            .execute(what, |agent| {
                agent
                    .post(url.as_str())
                    .header("Api-Key", &self.api_key)
                    .header("X-Pinecone-API-Version", API_VERSION)
                    .header("Content-Type", "application/json")
                    .send(body)
            })
            .map_err(|e| {
                StemError::VectorStore(format!(
                    "Pinecone index {}: {}",
                    self.index_name,
                    e.upstream_message()
                ))
            })?;

        Ok(response.body)
    }

    fn upsert_blocking(&self, namespace: &str, records: &[EmbeddingRecord]) -> Result<usize> {
        let mut written = 0;

        for batch in records.chunks(self.batch_size) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|record| UpsertVector {
                        id: &record.id,
                        values: &record.vector,
                        metadata: record.metadata.to_map(),
                    })
                    .collect(),
                namespace,
            };
            let body = serde_json::to_string(&request)
                .map_err(|e| StemError::VectorStore(format!("Failed to serialize upsert: {}", e)))?;

            let response = self.post("pinecone upsert", "vectors/upsert", &body)?;
            let parsed: UpsertResponse = serde_json::from_slice(&response).map_err(|e| {
                StemError::VectorStore(format!("Failed to parse upsert response: {}", e))
            })?;

            written += parsed.upserted_count.unwrap_or(batch.len());
            debug!(
                "Upserted {} vectors into {} ({} so far)",
                batch.len(),
                namespace,
                written
            );
        }

        Ok(written)
    }

    fn query_blocking(&self, namespace: &str, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::to_string(&QueryRequest {
            namespace,
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        })
        .map_err(|e| StemError::VectorStore(format!("Failed to serialize query: {}", e)))?;

        let response = self.post("pinecone query", "query", &body)?;
        let parsed: QueryResponse = serde_json::from_slice(&response)
            .map_err(|e| StemError::VectorStore(format!("Failed to parse query response: {}", e)))?;

        Ok(parsed.matches.into_iter().map(into_hit).collect())
    }
}

fn into_hit(found: QueryMatch) -> SearchHit {
    let mut metadata = found.metadata.unwrap_or_default();
    let text = match metadata.remove(TEXT_KEY) {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    SearchHit {
        id: found.id,
        text,
        metadata,
        score: found.score,
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let this = self.clone();
        let namespace = namespace.to_string();
        let written =
            tokio::task::spawn_blocking(move || this.upsert_blocking(&namespace, &records))
                .await
                .map_err(|e| StemError::VectorStore(format!("Upsert task failed: {}", e)))??;

        info!("Stored {} vectors in Pinecone index {}", written, self.index_name);
        Ok(written)
    }

    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let this = self.clone();
        let namespace = namespace.to_string();
        let vector = vector.to_vec();

        tokio::task::spawn_blocking(move || this.query_blocking(&namespace, &vector, top_k))
            .await
            .map_err(|e| StemError::VectorStore(format!("Query task failed: {}", e)))?
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let this = self.clone();
        let body = serde_json::to_string(&DeleteRequest {
            delete_all: true,
            namespace,
        })
        .map_err(|e| StemError::VectorStore(format!("Failed to serialize delete: {}", e)))?;

        tokio::task::spawn_blocking(move || this.post("pinecone delete", "vectors/delete", &body))
            .await
            .map_err(|e| StemError::VectorStore(format!("Delete task failed: {}", e)))??;

        info!("Deleted Pinecone namespace {}", namespace);
        Ok(())
    }
}
