//! Persistence: bot records (SQLite or Supabase) and embedding vectors
//! (Pinecone or LanceDB).

pub mod lancedb;
pub mod pinecone;
pub mod sqlite;
pub mod supabase;
pub mod vector;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub use vector::{ChunkMetadata, EmbeddingRecord, SearchHit, VectorStore, namespace_for_bot};

/// A tutoring bot built over one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bot {
    pub id: String,
    pub name: String,
    pub user_id: Option<String>,
    pub file_path: String,
    pub file_url: Option<String>,
    pub page_count: Option<i64>,
    pub file_size: Option<i64>,
    pub first_page_text: Option<String>,
    pub namespace: Option<String>,
    /// Set once ingestion completes; a bot without it is not yet searchable.
    pub parsed_at: Option<DateTime<Utc>>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    #[inline]
    pub fn is_searchable(&self) -> bool {
        self.parsed_at.is_some()
    }

    /// Namespace the bot's vectors live in, always derived from its id.
    #[inline]
    pub fn derived_namespace(&self) -> String {
        namespace_for_bot(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBot {
    pub name: String,
    pub user_id: Option<String>,
    pub file_path: String,
    pub file_url: Option<String>,
    pub page_count: Option<i64>,
    pub file_size: Option<i64>,
    pub first_page_text: Option<String>,
    pub metadata: Option<String>,
}

/// Storage for bot records.
#[async_trait]
pub trait BotStore: Send + Sync {
    async fn get_bot(&self, id: &str) -> Result<Option<Bot>>;

    /// Insert a bot; its namespace is derived from the generated id.
    async fn create_bot(&self, bot: NewBot) -> Result<Bot>;

    async fn list_bots(&self, user_id: Option<&str>) -> Result<Vec<Bot>>;

    /// Returns whether a record was removed.
    async fn delete_bot(&self, id: &str) -> Result<bool>;

    /// Record that ingestion finished for `id`. Returns whether the bot exists.
    async fn mark_processed(&self, id: &str, namespace: &str, at: DateTime<Utc>) -> Result<bool>;
}
