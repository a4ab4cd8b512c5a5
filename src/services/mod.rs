//! Construction of every component from [`Config`].
//!
//! Nothing in the crate holds a global client; the server and the CLI build
//! one [`Services`] at startup and share its `Arc`s.


use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{BotsBackend, Config, EmbeddingProvider, StorageBackend, VectorBackend};
use crate::database::lancedb::LanceStore;
use crate::database::pinecone::PineconeStore;
use crate::database::sqlite::Database;
use crate::database::supabase::SupabaseBotStore;
use crate::database::{BotStore, VectorStore};
use crate::embeddings::{Embedder, HuggingFaceEmbedder, OllamaClient};
use crate::extract::{PdfTextExtractor, TextExtractor};
use crate::http::HttpClient;
use crate::pipeline::{IngestionPipeline, QueryService};
use crate::server::AppState;
use crate::storage::{DocumentSource, LocalStorage, SupabaseStorage};
use crate::tutoring::Tutor;
use crate::{Result, StemError};

pub struct Services {
    pub config: Config,
    pub source: Arc<dyn DocumentSource>,
    /// Present when documents live on the local filesystem.
    pub local_storage: Option<Arc<LocalStorage>>,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub bots: Arc<dyn BotStore>,
    pub ingestion: Arc<IngestionPipeline>,
    pub query: Arc<QueryService>,
    pub tutor: Arc<Tutor>,
}

impl Services {
    #[inline]
    pub async fn from_config(config: Config) -> Result<Self> {
        let client = HttpClient::new(Duration::from_secs(config.embedding.timeout_secs))
            .with_retry_attempts(config.embedding.retry_attempts);
        // Only the model clients retry; storage and database calls fail on the first error
        let single_attempt = client.clone().with_retry_attempts(1);

        let (source, local_storage) = build_storage(&config, single_attempt.clone())?;
        let extractor: Arc<dyn TextExtractor> =
            Arc::new(PdfTextExtractor::new(config.storage.max_document_bytes));

        let ollama = OllamaClient::new(
            &config.ollama,
            &config.embedding.model,
            config.embedding.dimension as usize,
            client.clone(),
        )?;

        let embedder: Arc<dyn Embedder> = match config.embedding.provider {
            EmbeddingProvider::HuggingFace => {
                Arc::new(HuggingFaceEmbedder::from_config(&config, client.clone())?)
            }
            EmbeddingProvider::Ollama => Arc::new(ollama.clone()),
        };

        let vectors: Arc<dyn VectorStore> = match config.vector_store.backend {
            VectorBackend::Pinecone => {
                Arc::new(PineconeStore::from_config(&config, single_attempt.clone())?)
            }
            VectorBackend::LanceDb => Arc::new(
                LanceStore::open(config.vector_database_path(), embedder.dimension()).await?,
            ),
        };

        let bots: Arc<dyn BotStore> = match config.bots.backend {
            BotsBackend::Sqlite => {
                Arc::new(Database::initialize_from_config_dir(config.get_base_dir()).await?)
            }
            BotsBackend::Supabase => {
                Arc::new(SupabaseBotStore::from_config(&config, single_attempt)?)
            }
        };

        let ingestion = Arc::new(
            IngestionPipeline::new(
                source.clone(),
                extractor.clone(),
                embedder.clone(),
                vectors.clone(),
                bots.clone(),
            )
            .with_chunking(config.chunking.clone())
            .with_batch_size(config.embedding.batch_size as usize),
        );

        let query = Arc::new(
            QueryService::new(embedder.clone(), vectors.clone(), bots.clone())
                .with_default_top_k(config.retrieval.default_top_k),
        );

        let tutor = Arc::new(Tutor::new(Arc::new(ollama)).with_retrieval(query.clone()));

        info!(
            "Services ready: embeddings {} ({}), vectors {}",
            embedder.model_name(),
            embedder.dimension(),
            vectors.name()
        );

        Ok(Self {
            config,
            source,
            local_storage,
            extractor,
            embedder,
            vectors,
            bots,
            ingestion,
            query,
            tutor,
        })
    }

    #[inline]
    pub fn app_state(&self) -> AppState {
        AppState {
            ingestion: self.ingestion.clone(),
            query: self.query.clone(),
            tutor: self.tutor.clone(),
            request_timeout: Duration::from_secs(self.config.server.request_timeout_secs),
        }
    }
}

type StorageParts = (Arc<dyn DocumentSource>, Option<Arc<LocalStorage>>);

fn build_storage(config: &Config, client: HttpClient) -> Result<StorageParts> {
    match config.storage.backend {
        StorageBackend::Supabase => {
            let url = config
                .supabase
                .url
                .as_deref()
                .ok_or_else(|| StemError::Config("SUPABASE_URL is not configured".to_string()))?;
            let key = config.supabase.service_key.as_deref().ok_or_else(|| {
                StemError::Config("SUPABASE_SERVICE_ROLE_KEY is not configured".to_string())
            })?;

            debug!("Documents are read from Supabase bucket {}", config.storage.bucket);
            Ok((
                Arc::new(SupabaseStorage::new(url, &config.storage.bucket, key, client)),
                None,
            ))
        }
        StorageBackend::Local => {
            let local = Arc::new(LocalStorage::new(config.local_storage_root()));
            debug!("Documents are read from {}", local.root().display());
            Ok((local.clone(), Some(local)))
        }
    }
}
