use thiserror::Error;

pub type Result<T> = std::result::Result<T, StemError>;

#[derive(Error, Debug)]
pub enum StemError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extract;
pub mod http;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod services;
pub mod storage;
pub mod tutoring;

impl StemError {
    /// The wrapped message without the variant's prefix.
    #[inline]
    pub fn detail(&self) -> String {
        match self {
            Self::Config(message)
            | Self::InvalidInput(message)
            | Self::NotFound(message)
            | Self::Storage(message)
            | Self::Extraction(message)
            | Self::Embedding(message)
            | Self::VectorStore(message)
            | Self::Database(message)
            | Self::Network(message) => message.clone(),
            Self::Io(e) => e.to_string(),
            Self::Other(e) => format!("{:#}", e),
        }
    }
}
