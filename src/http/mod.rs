//! Blocking HTTP client shared by the hosted-API adapters.
//!
//! Every adapter (Supabase, HuggingFace, Ollama, Pinecone) goes through
//! [`HttpClient::execute`], which retries server errors and transport
//! failures with exponential backoff and returns client errors immediately
//! together with the response body, so upstream messages can be forwarded.

#[cfg(test)]
mod tests;

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use ureq::Body;
use ureq::http::Response;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl HttpError {
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable upstream message: the JSON `message`/`error` field when present, else the raw body.
    #[inline]
    pub fn upstream_message(&self) -> String {
        match self {
            Self::Status { status, body } => {
                let detail = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|value| {
                        ["message", "error", "msg"].iter().find_map(|key| {
                            value.get(*key).and_then(|v| match v {
                                serde_json::Value::String(s) => Some(s.clone()),
                                serde_json::Value::Null => None,
                                other => Some(other.to_string()),
                            })
                        })
                    })
                    .unwrap_or_else(|| body.trim().to_string());

                if detail.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    format!("HTTP {}: {}", status, detail)
                }
            }
            other => other.to_string(),
        }
    }
}

/// Successful response with its body already read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[inline]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[inline]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
    max_body_bytes: u64,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
    }
}

impl HttpClient {
    #[inline]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubles on every further attempt.
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    /// Run `request_fn` until it yields a 2xx/3xx response or a non-retryable failure.
    ///
    /// `what` names the operation in logs.
    pub fn execute<F>(&self, what: &str, mut request_fn: F) -> Result<HttpResponse, HttpError>
    where
        F: FnMut(&ureq::Agent) -> Result<Response<Body>, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("{}: attempt {}/{}", what, attempt, self.retry_attempts);

            match request_fn(&self.agent) {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let body = response
                        .body_mut()
                        .with_config()
                        .limit(self.max_body_bytes)
                        .read_to_vec()
                        .map_err(|e| HttpError::Body(e.to_string()))?;

                    if status < 400 {
                        debug!("{} succeeded on attempt {}", what, attempt);
                        return Ok(HttpResponse { status, body });
                    }

                    let error = HttpError::Status {
                        status,
                        body: String::from_utf8_lossy(&body).into_owned(),
                    };

                    if status >= 500 || status == 429 {
                        warn!(
                            "{}: server returned {}, attempt {}/{}",
                            what, status, attempt, self.retry_attempts
                        );
                        last_error = Some(error);
                    } else {
                        warn!("{}: client error (status {}), not retrying", what, status);
                        return Err(error);
                    }
                }
                Err(ureq::Error::StatusCode(status)) => {
                    // Only produced when an agent treats statuses as errors
                    let error = HttpError::Status {
                        status,
                        body: String::new(),
                    };
                    if status >= 500 {
                        last_error = Some(error);
                    } else {
                        return Err(error);
                    }
                }
                Err(error) => {
                    let transient = matches!(
                        error,
                        ureq::Error::ConnectionFailed
                            | ureq::Error::HostNotFound
                            | ureq::Error::Timeout(_)
                            | ureq::Error::Io(_)
                    );

                    if !transient {
                        warn!("{}: non-retryable error: {}", what, error);
                        return Err(HttpError::Transport(error.to_string()));
                    }

                    warn!(
                        "{}: transport error: {}, attempt {}/{}",
                        what, error, attempt, self.retry_attempts
                    );
                    last_error = Some(HttpError::Transport(error.to_string()));
                }
            };

            if attempt < self.retry_attempts {
                let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("{}: all {} attempts failed", what, self.retry_attempts);

        Err(last_error
            .unwrap_or_else(|| HttpError::Transport("Request failed after retries".to_string())))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Join `segments` onto `base`, normalising slashes on both sides.
#[inline]
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let trimmed = segment.trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        url.push('/');
        url.push_str(trimmed);
    }
    url
}
