//! Request orchestration: ingestion and namespace-scoped retrieval.
//!
//! Every stage failure is caught here and mapped to one [`ServiceError`],
//! which the HTTP layer turns into a status code and JSON body.

pub mod ingest;
pub mod query;

#[cfg(test)]
pub(crate) mod fakes;

use serde::Serialize;
use thiserror::Error;

pub use ingest::{IngestionPipeline, IngestionSummary};
pub use query::{QueryRequest, QueryResponse, QueryService};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Missing or malformed request fields.
    #[error("{message}")]
    InvalidInput { message: String },

    /// Unknown bot, unprocessed bot, or missing namespace/index.
    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<String>,
    },

    /// Storage, extraction, embedding, or vector database failure.
    #[error("{message}")]
    Upstream {
        message: String,
        details: Option<String>,
    },
}

/// JSON body sent for a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ServiceError {
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    #[inline]
    pub fn upstream(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Upstream { .. } => 500,
        }
    }

    #[inline]
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::InvalidInput { .. } => None,
            Self::NotFound { details, .. } | Self::Upstream { details, .. } => details.as_deref(),
        }
    }

    #[inline]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            details: self.details().map(str::to_string),
        }
    }
}
