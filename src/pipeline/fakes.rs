//! In-memory collaborators for orchestrator and endpoint tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::database::{Bot, BotStore, EmbeddingRecord, NewBot, SearchHit, VectorStore};
use crate::embeddings::Embedder;
use crate::extract::{ExtractedDocument, TextExtractor};
use crate::storage::DocumentSource;
use crate::{Result, StemError};

#[derive(Default)]
pub struct MemorySource {
    pub documents: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn with(key: &str, bytes: &[u8]) -> Self {
        let mut documents = HashMap::new();
        documents.insert(key.to_string(), bytes.to_vec());
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.documents
            .get(key)
            .cloned()
            .ok_or_else(|| StemError::Storage(format!("Object not found: {key}")))
    }
}

/// Ignores the bytes and returns fixed text.
pub struct StaticExtractor {
    pub text: std::result::Result<String, String>,
}

impl StaticExtractor {
    pub fn text(text: &str) -> Self {
        Self {
            text: Ok(text.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            text: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl TextExtractor for StaticExtractor {
    async fn extract(&self, _bytes: Vec<u8>) -> Result<ExtractedDocument> {
        match &self.text {
            Ok(text) => Ok(ExtractedDocument {
                text: text.clone(),
                page_count: 1,
                first_page_text: Some(text.clone()),
            }),
            Err(message) => Err(StemError::Extraction(message.clone())),
        }
    }
}

/// Deterministic 3-d vectors; can be told to fail on the n-th call.
pub struct FakeEmbedder {
    pub fail_on_call: Option<usize>,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        "sentence-transformers/all-mpnet-base-v2"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(StemError::Embedding(
                "HTTP 503: Model is currently loading".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, t.split_whitespace().count() as f32, 1.0])
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryVectors {
    pub namespaces: Mutex<HashMap<String, Vec<EmbeddingRecord>>>,
    /// Returned by every query.
    pub hits: Vec<SearchHit>,
    pub query_error: Option<String>,
    /// Upserts allowed to succeed before the rest fail.
    pub fail_after_upserts: Option<usize>,
    pub upserts: AtomicUsize,
    pub queried: Mutex<Vec<(String, usize)>>,
}

impl MemoryVectors {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub fn records(&self, namespace: &str) -> Vec<EmbeddingRecord> {
        self.namespaces
            .lock()
            .expect("lock should not be poisoned")
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectors {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        let done = self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_after_upserts.is_some_and(|limit| done >= limit) {
            return Err(StemError::VectorStore(
                "HTTP 429: Request rate limit exceeded".to_string(),
            ));
        }

        let count = records.len();
        self.namespaces
            .lock()
            .expect("lock should not be poisoned")
            .entry(namespace.to_string())
            .or_default()
            .extend(records);
        Ok(count)
    }

    async fn query(&self, namespace: &str, _vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        self.queried
            .lock()
            .expect("lock should not be poisoned")
            .push((namespace.to_string(), top_k));

        match &self.query_error {
            Some(message) => Err(StemError::VectorStore(message.clone())),
            None => Ok(self.hits.iter().take(top_k).cloned().collect()),
        }
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces
            .lock()
            .expect("lock should not be poisoned")
            .remove(namespace);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBots {
    pub bots: Mutex<HashMap<String, Bot>>,
    pub fail_writes: bool,
}

impl MemoryBots {
    pub fn with_bot(id: &str, parsed: bool) -> Self {
        let store = Self::default();
        store.insert(test_bot(id, parsed));
        store
    }

    pub fn insert(&self, bot: Bot) {
        self.bots
            .lock()
            .expect("lock should not be poisoned")
            .insert(bot.id.clone(), bot);
    }

    pub fn bot(&self, id: &str) -> Option<Bot> {
        self.bots
            .lock()
            .expect("lock should not be poisoned")
            .get(id)
            .cloned()
    }
}

pub fn test_bot(id: &str, parsed: bool) -> Bot {
    Bot {
        id: id.to_string(),
        name: format!("Bot {id}"),
        user_id: Some("user-1".to_string()),
        file_path: format!("user-1/{id}.pdf"),
        file_url: None,
        page_count: Some(1),
        file_size: Some(1024),
        first_page_text: None,
        namespace: Some(format!("bot-{id}")),
        parsed_at: parsed.then(Utc::now),
        metadata: None,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl BotStore for MemoryBots {
    async fn get_bot(&self, id: &str) -> Result<Option<Bot>> {
        Ok(self.bot(id))
    }

    async fn create_bot(&self, bot: NewBot) -> Result<Bot> {
        let id = format!("{}", self.bots.lock().expect("lock should not be poisoned").len() + 1);
        let created = Bot {
            name: bot.name,
            file_path: bot.file_path,
            user_id: bot.user_id,
            page_count: bot.page_count,
            first_page_text: bot.first_page_text,
            parsed_at: None,
            ..test_bot(&id, false)
        };
        self.insert(created.clone());
        Ok(created)
    }

    async fn list_bots(&self, _user_id: Option<&str>) -> Result<Vec<Bot>> {
        Ok(self
            .bots
            .lock()
            .expect("lock should not be poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn delete_bot(&self, id: &str) -> Result<bool> {
        Ok(self
            .bots
            .lock()
            .expect("lock should not be poisoned")
            .remove(id)
            .is_some())
    }

    async fn mark_processed(&self, id: &str, namespace: &str, at: DateTime<Utc>) -> Result<bool> {
        if self.fail_writes {
            return Err(StemError::Database("connection reset".to_string()));
        }

        let mut bots = self.bots.lock().expect("lock should not be poisoned");
        Ok(match bots.get_mut(id) {
            Some(bot) => {
                bot.parsed_at = Some(at);
                bot.namespace = Some(namespace.to_string());
                true
            }
            None => false,
        })
    }
}
