#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

pub const SOURCE_TAG: &str = "StemBot PDF";
const NAMESPACE_PREFIX: &str = "bot-";

/// Namespace holding one bot's embedding records.
#[inline]
pub fn namespace_for_bot(bot_id: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, bot_id)
}

/// Metadata stored next to every chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub text: String,
    /// Storage key of the source document
    pub file_path: String,
    pub chunk_index: u32,
    pub bot_id: String,
    pub source: String,
    /// Chunking policy that produced this chunk
    pub chunker: String,
    pub created_at: String,
}

impl ChunkMetadata {
    #[inline]
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// The durable unit upserted into a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One raw similarity-search match.
///
/// `score` is whatever the backend reports at the top level; backends that
/// only report it inside metadata leave it `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub score: Option<f64>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and the usage message.
    fn name(&self) -> &str;

    /// Append records to `namespace`. Returns how many were written.
    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize>;

    /// Nearest neighbours of `vector`, restricted to `namespace`.
    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;

    /// Remove every record in `namespace`.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}
