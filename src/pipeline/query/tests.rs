use super::*;
use crate::database::SearchHit;
use crate::pipeline::fakes::{FakeEmbedder, MemoryBots, MemoryVectors, test_bot};
use crate::retrieval::Confidence;
use crate::database::pinecone::PineconeStore;
use crate::http::HttpClient;
use serde_json::{Map, json};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hit(text: &str, score: Option<f64>) -> SearchHit {
    SearchHit {
        id: format!("id-{text}"),
        text: text.to_string(),
        metadata: Map::new(),
        score,
    }
}

fn service(vectors: Arc<MemoryVectors>, bots: MemoryBots) -> QueryService {
    QueryService::new(Arc::new(FakeEmbedder::new()), vectors, Arc::new(bots))
}

fn request(query: &str, bot_id: &str) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        bot_id: bot_id.to_string(),
        ..QueryRequest::default()
    }
}

#[tokio::test]
async fn hits_are_filtered_ranked_and_labelled() {
    let vectors = Arc::new(MemoryVectors::with_hits(vec![
        hit("a", Some(0.9)),
        hit("b", Some(0.55)),
        hit("c", None),
    ]));
    let service = service(vectors.clone(), MemoryBots::with_bot("42", true));

    let response = service
        .retrieve(QueryRequest {
            score_threshold: Some(0.6),
            ..request("  what is entropy?  ", "42")
        })
        .await
        .expect("query should succeed");

    assert!(response.success);
    assert_eq!(response.query, "what is entropy?");
    assert_eq!(response.namespace, "bot-42");
    assert_eq!(response.top_k, DEFAULT_TOP_K);
    assert_eq!(response.total_available, 3);
    assert_eq!(response.results_count, 2);
    assert_eq!(response.average_score, Some(0.9));

    let labels: Vec<(&str, Confidence)> = response
        .results
        .iter()
        .map(|r| (r.text.as_str(), r.confidence))
        .collect();
    assert_eq!(
        labels,
        vec![("a", Confidence::VeryHigh), ("c", Confidence::Unknown)]
    );

    let queried = vectors.queried.lock().expect("lock should not be poisoned");
    assert_eq!(*queried, vec![("bot-42".to_string(), DEFAULT_TOP_K)]);
}

#[tokio::test]
async fn top_k_is_clamped_before_searching() {
    let vectors = Arc::new(MemoryVectors::default());
    let service = service(vectors.clone(), MemoryBots::with_bot("42", true));

    for (requested, expected) in [(0.0, 1), (100.0, 20), (7.9, 7)] {
        let response = service
            .retrieve(QueryRequest {
                top_k: Some(requested),
                ..request("q", "42")
            })
            .await
            .expect("query should succeed");
        assert_eq!(response.top_k, expected);
    }

    let queried: Vec<usize> = vectors
        .queried
        .lock()
        .expect("lock should not be poisoned")
        .iter()
        .map(|(_, k)| *k)
        .collect();
    assert_eq!(queried, vec![1, 20, 7]);
}

#[tokio::test]
async fn configured_default_top_k_applies_when_omitted() {
    let vectors = Arc::new(MemoryVectors::default());
    let service = service(vectors, MemoryBots::with_bot("42", true)).with_default_top_k(50);

    let response = service
        .retrieve(request("q", "42"))
        .await
        .expect("query should succeed");

    assert_eq!(response.top_k, 20);
}

#[tokio::test]
async fn empty_result_set_has_no_average() {
    let service = service(
        Arc::new(MemoryVectors::default()),
        MemoryBots::with_bot("42", true),
    );

    let response = service
        .retrieve(request("q", "42"))
        .await
        .expect("query should succeed");

    assert_eq!(response.results_count, 0);
    assert_eq!(response.average_score, None);

    let body = serde_json::to_value(&response).expect("response should serialize");
    assert!(body.get("averageScore").is_none());
    assert!(body.get("scoreThreshold").is_none());
    assert_eq!(body["resultsCount"], json!(0));
    assert_eq!(body["botId"], json!("42"));
}

#[tokio::test]
async fn missing_fields_are_client_errors() {
    let service = service(
        Arc::new(MemoryVectors::default()),
        MemoryBots::with_bot("42", true),
    );

    let error = service
        .retrieve(request("   ", "42"))
        .await
        .expect_err("blank query should fail");
    assert_eq!(
        error,
        ServiceError::invalid_input("Missing or empty query parameter")
    );

    let error = service
        .retrieve(request("q", ""))
        .await
        .expect_err("missing bot should fail");
    assert_eq!(error, ServiceError::invalid_input("Missing botId parameter"));
    assert_eq!(error.status_code(), 400);
}

#[tokio::test]
async fn unknown_and_unprocessed_bots_are_not_found() {
    let vectors = Arc::new(MemoryVectors::default());
    let service = service(vectors.clone(), MemoryBots::with_bot("7", false));

    let error = service
        .retrieve(request("q", "42"))
        .await
        .expect_err("unknown bot should fail");
    assert_eq!(error.status_code(), 404);
    assert_eq!(error.to_string(), "Bot not found");
    assert!(
        error
            .details()
            .is_some_and(|d| d.contains("process a document first"))
    );

    let error = service
        .retrieve(request("q", "7"))
        .await
        .expect_err("unprocessed bot should fail");
    assert_eq!(error.status_code(), 404);
    assert_eq!(error.to_string(), "Bot has not been processed yet");

    assert!(
        vectors
            .queried
            .lock()
            .expect("lock should not be poisoned")
            .is_empty()
    );
}

#[tokio::test]
async fn stale_stored_namespace_is_ignored() {
    let bots = MemoryBots::default();
    bots.insert(crate::database::Bot {
        namespace: Some("temp-namespace".to_string()),
        ..test_bot("42", true)
    });
    let service = service(Arc::new(MemoryVectors::default()), bots);

    let response = service
        .retrieve(request("q", "42"))
        .await
        .expect("query should succeed");

    assert_eq!(response.namespace, "bot-42");
}

#[tokio::test]
async fn embedding_failure_is_upstream() {
    let service = QueryService::new(
        Arc::new(FakeEmbedder::failing_on(1)),
        Arc::new(MemoryVectors::default()),
        Arc::new(MemoryBots::with_bot("42", true)),
    );

    let error = service
        .retrieve(request("q", "42"))
        .await
        .expect_err("embedding should fail");

    assert_eq!(
        error,
        ServiceError::upstream(
            "Failed to embed query",
            "HTTP 503: Model is currently loading"
        )
    );
}

#[tokio::test]
async fn search_failures_map_by_upstream_text() {
    let cases = [
        (
            "HTTP 404: Namespace not found",
            404,
            "Namespace 'bot-42' does not exist or is empty",
        ),
        (
            "Index embeddings not found",
            404,
            "Vector index not found: Index embeddings not found",
        ),
        ("HTTP 500: internal", 500, "HTTP 500: internal"),
        (
            "Pinecone index stembot-vectors-hf: HTTP 401: Invalid API Key",
            500,
            "Pinecone index stembot-vectors-hf: HTTP 401: Invalid API Key",
        ),
        (
            "Index embeddings stores 4-dimensional vectors but the embedding model produces 3",
            500,
            "Index embeddings stores 4-dimensional vectors but the embedding model produces 3",
        ),
        (
            "Missing chunk_index column",
            500,
            "Missing chunk_index column",
        ),
    ];

    for (upstream, status, details) in cases {
        let vectors = Arc::new(MemoryVectors {
            query_error: Some(upstream.to_string()),
            ..MemoryVectors::default()
        });
        let service = service(vectors, MemoryBots::with_bot("42", true));

        let error = service
            .retrieve(request("q", "42"))
            .await
            .expect_err("search should fail");

        assert_eq!(error.status_code(), status, "for {upstream}");
        assert_eq!(error.to_string(), "Similarity search failed");
        assert_eq!(error.details(), Some(details));
    }
}

fn pinecone_service(server: &MockServer) -> QueryService {
    let store = PineconeStore::new(
        &server.uri(),
        "stembot-vectors-hf",
        "pc-key",
        100,
        HttpClient::new(Duration::from_secs(5)).with_retry_attempts(1),
    );
    QueryService::new(
        Arc::new(FakeEmbedder::new()),
        Arc::new(store),
        Arc::new(MemoryBots::with_bot("42", true)),
    )
}

#[tokio::test]
async fn pinecone_auth_failure_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API Key"})))
        .expect(1)
        .mount(&server)
        .await;

    let error = pinecone_service(&server)
        .retrieve(request("q", "42"))
        .await
        .expect_err("search should fail");

    assert_eq!(error.status_code(), 500);
    assert_eq!(
        error.details(),
        Some("Pinecone index stembot-vectors-hf: HTTP 401: Invalid API Key")
    );
}

#[tokio::test]
async fn pinecone_missing_namespace_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Namespace not found"})))
        .mount(&server)
        .await;

    let error = pinecone_service(&server)
        .retrieve(request("q", "42"))
        .await
        .expect_err("search should fail");

    assert_eq!(error.status_code(), 404);
    assert_eq!(
        error.details(),
        Some("Namespace 'bot-42' does not exist or is empty")
    );
}
