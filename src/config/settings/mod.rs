
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::{ChunkingConfig, ChunkingStrategy};
use crate::retrieval::{DEFAULT_TOP_K, MAX_TOP_K, MIN_TOP_K};

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
pub const DEFAULT_INDEX_NAME: &str = "stembot-vectors-hf";
pub const DEFAULT_BUCKET: &str = "bots";
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub huggingface: HuggingFaceConfig,
    pub ollama: OllamaConfig,
    pub vector_store: VectorStoreConfig,
    pub storage: StorageConfig,
    pub supabase: SupabaseConfig,
    pub bots: BotsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    HuggingFace,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: u32,
    pub batch_size: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::HuggingFace,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 32,
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HuggingFaceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co/hf-inference/models".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub generation_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            generation_model: "llama2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    #[default]
    Pinecone,
    LanceDb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub index_name: String,
    /// Data-plane host of the Pinecone index, e.g. `https://<index>-<project>.svc.<region>.pinecone.io`
    pub index_host: Option<String>,
    pub api_key: Option<String>,
    pub upsert_batch_size: u32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Pinecone,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            index_host: None,
            api_key: None,
            upsert_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Supabase,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    /// Root directory for the local backend; relative paths resolve against the config directory
    pub local_root: PathBuf,
    pub max_document_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Supabase,
            bucket: DEFAULT_BUCKET.to_string(),
            local_root: PathBuf::from("documents"),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotsBackend {
    #[default]
    Sqlite,
    Supabase,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotsConfig {
    pub backend: BotsBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidRequestTimeout(u64),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidEmbeddingTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid index name: {0} (cannot be empty)")]
    InvalidIndexName(String),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidUpsertBatchSize(u32),
    #[error("Invalid bucket name: {0} (cannot be empty)")]
    InvalidBucket(String),
    #[error("Invalid max document size: {0} bytes (must be between 1 and 104857600)")]
    InvalidMaxDocumentBytes(u64),
    #[error("Invalid chunk window: {0} characters (must be between 100 and 8000)")]
    InvalidChunkWindow(usize),
    #[error("Invalid default top-k: {0} (must be between {min} and {max})", min = MIN_TOP_K, max = MAX_TOP_K)]
    InvalidDefaultTopK(usize),
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Directory holding `config.toml`, the SQLite database and local vectors.
    ///
    /// `STEMBOT_HOME` wins over `~/.stembot`.
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(home) = std::env::var_os("STEMBOT_HOME") {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|home| home.join(".stembot"))
            .or_else(|| dirs::data_dir().map(|data| data.join("stembot")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };

        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_env_overrides();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Overlay secrets and endpoints from the process environment.
    #[inline]
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay settings from an arbitrary key lookup; empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("PINECONE_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(name) = get("PINECONE_INDEX_NAME") {
            self.vector_store.index_name = name;
        }
        if let Some(host) = get("PINECONE_HOST") {
            self.vector_store.index_host = Some(host);
        }
        if let Some(key) = get("HUGGINGFACE_API_KEY") {
            self.huggingface.api_key = Some(key);
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase.service_key = Some(key);
        }
        if let Some(port) = get("STEMBOT_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_embedding()?;
        self.ollama.validate()?;
        self.validate_vector_store()?;
        self.validate_storage()?;
        self.validate_chunking()?;

        if !(MIN_TOP_K..=MAX_TOP_K).contains(&self.retrieval.default_top_k) {
            return Err(ConfigError::InvalidDefaultTopK(
                self.retrieval.default_top_k,
            ));
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        if !(1..=600).contains(&self.server.request_timeout_secs) {
            return Err(ConfigError::InvalidRequestTimeout(
                self.server.request_timeout_secs,
            ));
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        let config = &self.embedding;

        if config.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(config.model.clone()));
        }

        if !(64..=4096).contains(&config.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(config.dimension));
        }

        if config.batch_size == 0 || config.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(config.batch_size));
        }

        if !(1..=300).contains(&config.timeout_secs) {
            return Err(ConfigError::InvalidEmbeddingTimeout(config.timeout_secs));
        }

        if !(1..=10).contains(&config.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(config.retry_attempts));
        }

        let base_url = Url::parse(&self.huggingface.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.huggingface.base_url.clone()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidProtocol(base_url.scheme().to_string()));
        }

        Ok(())
    }

    fn validate_vector_store(&self) -> Result<(), ConfigError> {
        let config = &self.vector_store;

        if config.index_name.trim().is_empty() {
            return Err(ConfigError::InvalidIndexName(config.index_name.clone()));
        }

        if config.upsert_batch_size == 0 || config.upsert_batch_size > 1000 {
            return Err(ConfigError::InvalidUpsertBatchSize(
                config.upsert_batch_size,
            ));
        }

        if let Some(host) = &config.index_host {
            Url::parse(host).map_err(|_| ConfigError::InvalidUrl(host.clone()))?;
        }

        Ok(())
    }

    fn validate_storage(&self) -> Result<(), ConfigError> {
        let config = &self.storage;

        if config.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidBucket(config.bucket.clone()));
        }

        if !(1..=100 * 1024 * 1024).contains(&config.max_document_bytes) {
            return Err(ConfigError::InvalidMaxDocumentBytes(
                config.max_document_bytes,
            ));
        }

        if let Some(url) = &self.supabase.url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.strategy == ChunkingStrategy::FixedWidth
            && !(100..=8000).contains(&config.window_chars)
        {
            return Err(ConfigError::InvalidChunkWindow(config.window_chars));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite bot database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("bots.db")
    }

    /// Get the path for the embedded vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn local_storage_root(&self) -> PathBuf {
        if self.storage.local_root.is_absolute() {
            self.storage.local_root.clone()
        } else {
            self.get_base_dir().join(&self.storage.local_root)
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    /// Copy of this config with every secret masked, for display.
    #[inline]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.huggingface.api_key = copy.huggingface.api_key.as_deref().map(mask_secret);
        copy.vector_store.api_key = copy.vector_store.api_key.as_deref().map(mask_secret);
        copy.supabase.service_key = copy.supabase.service_key.as_deref().map(mask_secret);
        copy
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.ollama_url()?;

        if self.generation_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.generation_model.clone()));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

/// Show only the first and last four characters of a secret.
#[inline]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
