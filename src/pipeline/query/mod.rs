#[cfg(test)]
mod tests;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::StemError;
use crate::database::{BotStore, VectorStore};
use crate::embeddings::Embedder;
use crate::pipeline::ServiceError;
use crate::retrieval::{DEFAULT_TOP_K, FormattedHit, clamp_top_k, format_hits};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    pub query: String,
    pub bot_id: String,
    pub top_k: Option<f64>,
    pub score_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    pub query: String,
    pub bot_id: String,
    pub namespace: String,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,
    pub results_count: usize,
    pub total_available: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
    pub results: Vec<FormattedHit>,
    pub timestamp: String,
}

/// Embed a question and search the asking bot's namespace.
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    bots: Arc<dyn BotStore>,
    default_top_k: usize,
}

impl QueryService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        bots: Arc<dyn BotStore>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            bots,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    #[inline]
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = clamp_top_k(top_k as f64);
        self
    }

    /// Namespace of a bot that has finished ingestion.
    #[inline]
    pub async fn resolve_namespace(&self, bot_id: &str) -> Result<String, ServiceError> {
        let bot = self.bots.get_bot(bot_id).await.map_err(|e| {
            error!("Bot lookup failed for {}: {}", bot_id, e);
            ServiceError::upstream("Failed to look up bot", e.detail())
        })?;

        let Some(bot) = bot else {
            return Err(ServiceError::not_found(
                "Bot not found",
                format!(
                    "No bot with id {}. Upload and process a document first.",
                    bot_id
                ),
            ));
        };

        if !bot.is_searchable() {
            return Err(ServiceError::not_found(
                "Bot has not been processed yet",
                format!(
                    "Bot {} has not finished processing. Process its document first.",
                    bot_id
                ),
            ));
        }

        let namespace = bot.derived_namespace();
        if let Some(stored) = bot.namespace.as_deref()
            && stored != namespace
        {
            warn!(
                "Bot {} has stale stored namespace {}, using {}",
                bot_id, stored, namespace
            );
        }

        Ok(namespace)
    }

    #[inline]
    pub async fn retrieve(&self, request: QueryRequest) -> Result<QueryResponse, ServiceError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ServiceError::invalid_input("Missing or empty query parameter"));
        }

        let bot_id = request.bot_id.trim();
        if bot_id.is_empty() {
            return Err(ServiceError::invalid_input("Missing botId parameter"));
        }

        let namespace = self.resolve_namespace(bot_id).await?;
        let top_k = request.top_k.map_or(self.default_top_k, clamp_top_k);

        debug!("Searching {} for top {} matches", namespace, top_k);

        let vector = self.embedder.embed_query(query).await.map_err(|e| {
            error!("Query embedding failed: {}", e);
            ServiceError::upstream("Failed to embed query", e.detail())
        })?;

        let hits = self
            .vectors
            .query(&namespace, &vector, top_k)
            .await
            .map_err(|e| search_error(&namespace, &e))?;

        let formatted = format_hits(hits, request.score_threshold);
        info!(
            "Query for bot {} returned {} of {} hits",
            bot_id,
            formatted.results.len(),
            formatted.total_available
        );

        Ok(QueryResponse {
            success: true,
            query: query.to_string(),
            bot_id: bot_id.to_string(),
            namespace,
            top_k,
            score_threshold: request.score_threshold.filter(|t| t.is_finite()),
            results_count: formatted.results.len(),
            total_available: formatted.total_available,
            average_score: formatted.average_score,
            results: formatted.results,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

const MISSING_PHRASES: [&str; 3] = ["not found", "does not exist", "no such"];

/// Search failures reporting a missing namespace or index become not-found.
fn search_error(namespace: &str, error: &StemError) -> ServiceError {
    let detail = error.detail();
    let lowered = detail.to_lowercase();
    let missing = MISSING_PHRASES.iter().any(|phrase| lowered.contains(phrase));

    if missing && lowered.contains("namespace") {
        warn!("Search in {} failed: {}", namespace, detail);
        ServiceError::not_found(
            "Similarity search failed",
            format!("Namespace '{}' does not exist or is empty", namespace),
        )
    } else if missing && lowered.contains("index") {
        warn!("Search in {} failed: {}", namespace, detail);
        ServiceError::not_found(
            "Similarity search failed",
            format!("Vector index not found: {}", detail),
        )
    } else {
        error!("Search in {} failed: {}", namespace, detail);
        ServiceError::upstream("Similarity search failed", detail)
    }
}
