
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::vector::SOURCE_TAG;
use crate::database::{BotStore, ChunkMetadata, EmbeddingRecord, VectorStore, namespace_for_bot};
use crate::embeddings::{ChunkingConfig, Embedder, TextChunk, chunk_text};
use crate::extract::TextExtractor;
use crate::pipeline::ServiceError;
use crate::storage::DocumentSource;

const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub chunks: usize,
    pub embedding_model: String,
    pub namespace: String,
    pub bot_id: String,
}

/// Fetch, extract, chunk, embed, and upsert one document into its bot's namespace.
///
/// Chunks are embedded and written batch by batch. A failure part-way leaves
/// the earlier batches in the vector store; nothing is rolled back, and a
/// re-run appends new records next to them.
pub struct IngestionPipeline {
    source: Arc<dyn DocumentSource>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    bots: Arc<dyn BotStore>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        source: Arc<dyn DocumentSource>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        bots: Arc<dyn BotStore>,
    ) -> Self {
        Self {
            source,
            extractor,
            embedder,
            vectors,
            bots,
            chunking: ChunkingConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Number of chunks embedded and upserted per round trip.
    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    #[inline]
    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    #[inline]
    pub async fn ingest(&self, file_path: &str, bot_id: &str) -> Result<IngestionSummary, ServiceError> {
        let file_path = file_path.trim();
        let bot_id = bot_id.trim();
        if file_path.is_empty() || bot_id.is_empty() {
            return Err(ServiceError::invalid_input("Missing filePath or botId"));
        }

        info!("Processing {} for bot {}", file_path, bot_id);

        let bytes = self.source.fetch(file_path).await.map_err(|e| {
            error!("Document download failed for {}: {}", file_path, e);
            ServiceError::upstream("Failed to download PDF", e.detail())
        })?;
        if bytes.is_empty() {
            error!("Downloaded document {} is empty", file_path);
            return Err(ServiceError::upstream(
                "Failed to download PDF",
                "Downloaded document is empty",
            ));
        }
        debug!("Downloaded {} bytes", bytes.len());

        let document = self.extractor.extract(bytes).await.map_err(|e| {
            error!("Text extraction failed for {}: {}", file_path, e);
            ServiceError::upstream("Failed to parse PDF", e.detail())
        })?;
        if document.is_blank() {
            warn!("No text content found in {}", file_path);
            return Err(ServiceError::invalid_input("No text content found in PDF"));
        }

        let chunks = chunk_text(&document.text, &self.chunking);
        if chunks.is_empty() {
            error!("Chunker produced nothing for {}", file_path);
            return Err(ServiceError::upstream(
                "No content to index",
                format!(
                    "The {} chunker produced no chunks from {} characters of text",
                    self.chunking.strategy,
                    document.text.len()
                ),
            ));
        }
        info!(
            "Split {} into {} chunks ({})",
            file_path,
            chunks.len(),
            self.chunking.strategy
        );

        let namespace = namespace_for_bot(bot_id);
        self.embed_and_store(file_path, bot_id, &namespace, &chunks)
            .await?;

        match self.bots.mark_processed(bot_id, &namespace, Utc::now()).await {
            Ok(true) => debug!("Marked bot {} as processed", bot_id),
            Ok(false) => warn!("Bot {} not found; processing timestamp not recorded", bot_id),
            Err(e) => warn!("Failed to record processing timestamp for bot {}: {}", bot_id, e),
        }

        info!(
            "Stored {} chunks for bot {} in {}",
            chunks.len(),
            bot_id,
            namespace
        );

        Ok(IngestionSummary {
            chunks: chunks.len(),
            embedding_model: self.embedder.model_name().to_string(),
            namespace,
            bot_id: bot_id.to_string(),
        })
    }

    async fn embed_and_store(
        &self,
        file_path: &str,
        bot_id: &str,
        namespace: &str,
        chunks: &[TextChunk],
    ) -> Result<(), ServiceError> {
        let total = chunks.len();
        let mut stored = 0;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();

            let vectors = self.embedder.embed_documents(&texts).await.map_err(|e| {
                error!("Embedding failed after {} of {} chunks: {}", stored, total, e);
                ServiceError::upstream(
                    "Failed to generate embeddings",
                    partial_detail(stored, total, &e.detail()),
                )
            })?;

            if vectors.len() != batch.len() {
                return Err(ServiceError::upstream(
                    "Failed to generate embeddings",
                    partial_detail(
                        stored,
                        total,
                        &format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                    ),
                ));
            }

            let created_at = Utc::now().to_rfc3339();
            let records: Vec<EmbeddingRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddingRecord {
                    id: Uuid::new_v4().to_string(),
                    vector,
                    metadata: ChunkMetadata {
                        text: chunk.content.clone(),
                        file_path: file_path.to_string(),
                        chunk_index: chunk.index as u32,
                        bot_id: bot_id.to_string(),
                        source: SOURCE_TAG.to_string(),
                        chunker: self.chunking.strategy.as_str().to_string(),
                        created_at: created_at.clone(),
                    },
                })
                .collect();

            self.vectors
                .upsert(namespace, records)
                .await
                .map_err(|e| {
                    error!("Upsert failed after {} of {} chunks: {}", stored, total, e);
                    ServiceError::upstream(
                        "Failed to store embeddings",
                        partial_detail(stored, total, &e.detail()),
                    )
                })?;

            stored += batch.len();
            debug!("Stored {}/{} chunks in {}", stored, total, namespace);
        }

        Ok(())
    }
}

fn partial_detail(stored: usize, total: usize, cause: &str) -> String {
    if stored == 0 {
        cause.to_string()
    } else {
        format!(
            "{} (stored {} of {} chunks before the failure)",
            cause, stored, total
        )
    }
}
