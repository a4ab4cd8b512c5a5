//! STEM tutoring chat on top of a text-generation model.
//!
//! When the caller names a bot, the best passages from that bot's namespace
//! are placed ahead of the tutor prompt. Grounding is best effort: a failed
//! lookup is logged and the question is answered without passages.


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::embeddings::OllamaClient;
use crate::pipeline::{QueryRequest, QueryService, ServiceError};

const TUTOR_INSTRUCTIONS: &str = "You are a helpful STEM tutor. Provide clear, step-by-step explanations to solve problems. \n  First explain the concept, then show the steps to solve the specific problem.";
const DEFAULT_CONTEXT_PASSAGES: usize = 3;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl TextGenerator for OllamaClient {
    fn model_id(&self) -> &str {
        self.generation_model()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        OllamaClient::generate(self, prompt).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutoringRequest {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutoringResponse {
    pub response: String,
    pub user_id: Option<String>,
}

/// Render the tutor prompt, with retrieved passages first when there are any.
#[inline]
pub fn build_prompt(input: &str, passages: &[String]) -> String {
    let mut prompt = String::new();

    if !passages.is_empty() {
        prompt.push_str("Use the following course material when it is relevant:\n\n");
        let numbered: Vec<String> = passages
            .iter()
            .enumerate()
            .map(|(i, passage)| format!("[{}] {}", i + 1, passage.trim()))
            .collect();
        prompt.push_str(&numbered.join("\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str(TUTOR_INSTRUCTIONS);
    prompt.push_str("\n\nStudent: ");
    prompt.push_str(input);
    prompt.push_str("\nTutor: ");
    prompt
}

pub struct Tutor {
    generator: Arc<dyn TextGenerator>,
    retrieval: Option<Arc<QueryService>>,
    context_passages: usize,
}

impl Tutor {
    #[inline]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            retrieval: None,
            context_passages: DEFAULT_CONTEXT_PASSAGES,
        }
    }

    /// Ground answers on a bot's documents when the request names one.
    #[inline]
    pub fn with_retrieval(mut self, retrieval: Arc<QueryService>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    #[inline]
    pub fn with_context_passages(mut self, passages: usize) -> Self {
        self.context_passages = passages.max(1);
        self
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    #[inline]
    pub async fn answer(&self, request: TutoringRequest) -> std::result::Result<TutoringResponse, ServiceError> {
        let input = request.input.trim();
        if input.is_empty() {
            return Err(ServiceError::invalid_input("Input is required"));
        }

        let passages = match request.bot_id.as_deref().map(str::trim) {
            Some(bot_id) if !bot_id.is_empty() => self.passages(input, bot_id).await,
            _ => Vec::new(),
        };

        let prompt = build_prompt(input, &passages);
        debug!(
            "Tutoring prompt with {} passages ({} chars)",
            passages.len(),
            prompt.len()
        );

        let response = self.generator.generate(&prompt).await.map_err(|e| {
            error!("Tutoring generation failed: {}", e);
            ServiceError::upstream("Internal server error", e.detail())
        })?;

        info!("Tutor answered with {}", self.generator.model_id());

        Ok(TutoringResponse {
            response,
            user_id: request.user_id,
        })
    }

    async fn passages(&self, input: &str, bot_id: &str) -> Vec<String> {
        let Some(retrieval) = &self.retrieval else {
            return Vec::new();
        };

        let request = QueryRequest {
            query: input.to_string(),
            bot_id: bot_id.to_string(),
            top_k: Some(self.context_passages as f64),
            score_threshold: None,
        };

        match retrieval.retrieve(request).await {
            Ok(found) => found.results.into_iter().map(|hit| hit.text).collect(),
            Err(e) => {
                warn!("Answering without passages for bot {}: {}", bot_id, e);
                Vec::new()
            }
        }
    }
}
