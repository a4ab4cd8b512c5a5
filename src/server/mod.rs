//! HTTP surface: `/process`, `/retrieve` and `/tutoring` on axum.
//!
//! Handlers read the raw body so a malformed payload can be answered with
//! `{"error":"Invalid JSON"}` instead of axum's plain-text rejection. Every
//! handler runs under the configured request timeout.


use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::{ErrorBody, IngestionPipeline, QueryRequest, QueryService, ServiceError};
use crate::tutoring::{Tutor, TutoringRequest};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionPipeline>,
    pub query: Arc<QueryService>,
    pub tutor: Arc<Tutor>,
    pub request_timeout: Duration,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
            details: None,
        }),
    )
        .into_response()
}

/// Build the application router
#[inline]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/process", post(process_document).get(process_usage))
        .route("/retrieve", post(retrieve).options(retrieve_preflight))
        .route("/tutoring", post(tutoring))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
#[inline]
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("StemBot listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn with_timeout<F>(timeout: Duration, handler: F) -> Response
where
    F: Future<Output = Response>,
{
    match tokio::time::timeout(timeout, handler).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Request exceeded {:?}", timeout);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Request timed out")
        }
    }
}

/// Parse a JSON object body; anything else is answered with 400.
fn parse_body(body: &Bytes) -> Result<Value, Response> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "Invalid JSON")),
    }
}

/// String field that may also arrive as a JSON number, e.g. a numeric bot id.
fn id_field(body: &Value, key: &str) -> String {
    match body.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn optional_id_field(body: &Value, key: &str) -> Option<String> {
    Some(id_field(body, key)).filter(|value| !value.is_empty())
}

async fn process_document(State(state): State<AppState>, body: Bytes) -> Response {
    let timeout = state.request_timeout;
    with_timeout(timeout, async move {
        let body = match parse_body(&body) {
            Ok(body) => body,
            Err(response) => return response,
        };

        let file_path = id_field(&body, "filePath");
        let bot_id = id_field(&body, "botId");

        match state.ingestion.ingest(&file_path, &bot_id).await {
            Ok(summary) => Json(json!({
                "message": "PDF processed and embeddings stored",
                "details": summary,
            }))
            .into_response(),
            Err(e) => e.into_response(),
        }
    })
    .await
}

async fn process_usage(State(state): State<AppState>) -> Json<Value> {
    let model = state.ingestion.embedding_model();
    Json(json!({
        "message": format!("PDF processing API is running ({})", model),
        "usage": r#"Send a POST request with { "filePath": "your-file.pdf", "botId": "bot-uuid" }"#,
        "note": format!(
            "Ensure the vector index dimension matches the model ({} for {})",
            state.ingestion.embedding_dimension(),
            model
        ),
    }))
}

async fn retrieve(State(state): State<AppState>, body: Bytes) -> Response {
    let timeout = state.request_timeout;
    let mut response = with_timeout(timeout, async move {
        let body = match parse_body(&body) {
            Ok(body) => body,
            Err(response) => return response,
        };

        let request = QueryRequest {
            query: body
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            bot_id: id_field(&body, "botId"),
            top_k: body.get("topK").and_then(Value::as_f64),
            score_threshold: body.get("scoreThreshold").and_then(Value::as_f64),
        };

        match state.query.retrieve(request).await {
            Ok(found) => Json(found).into_response(),
            Err(e) => e.into_response(),
        }
    })
    .await;

    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn retrieve_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

async fn tutoring(State(state): State<AppState>, body: Bytes) -> Response {
    let timeout = state.request_timeout;
    with_timeout(timeout, async move {
        let body = match parse_body(&body) {
            Ok(body) => body,
            Err(response) => return response,
        };

        let request = TutoringRequest {
            input: body
                .get("input")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            bot_id: optional_id_field(&body, "botId"),
            user_id: optional_id_field(&body, "userId"),
        };

        match state.tutor.answer(request).await {
            Ok(answer) => Json(answer).into_response(),
            Err(e) => e.into_response(),
        }
    })
    .await
}
