//! Embedding models and the text chunker that feeds them.

pub mod chunking;
pub mod huggingface;
pub mod ollama;


use async_trait::async_trait;

use crate::{Result, StemError};

pub use chunking::{ChunkingConfig, ChunkingStrategy, TextChunk, chunk_text};
pub use huggingface::HuggingFaceEmbedder;
pub use ollama::OllamaClient;

/// A hosted model mapping text to fixed-length vectors.
///
/// Implementations are constructed once and shared behind an `Arc`; they hold
/// no per-request state.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Full model identifier as sent to the provider.
    fn model_id(&self) -> &str;

    /// Length of every vector this model returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of documents, one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    #[inline]
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| StemError::Embedding("Model returned no vector for query".to_string()))
    }

    /// Short model name reported to callers, e.g. `all-mpnet-base-v2`.
    #[inline]
    fn model_name(&self) -> &str {
        short_model_name(self.model_id())
    }
}

/// Last path segment of a model identifier.
#[inline]
pub fn short_model_name(model_id: &str) -> &str {
    model_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(model_id)
}

/// Check that a provider answered with one vector of the right length per input.
#[inline]
pub fn check_vectors(vectors: &[Vec<f32>], expected_count: usize, dimension: usize) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(StemError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected_count,
            vectors.len()
        )));
    }

    if let Some((index, vector)) = vectors
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != dimension)
    {
        return Err(StemError::Embedding(format!(
            "Embedding {} has dimension {}, expected {}",
            index,
            vector.len(),
            dimension
        )));
    }

    Ok(())
}
