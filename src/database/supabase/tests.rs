use super::*;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer) -> SupabaseBotStore {
    SupabaseBotStore::new(
        &server.uri(),
        "service-key",
        HttpClient::new(Duration::from_secs(5))
            .with_retry_attempts(1)
            .with_backoff(Duration::from_millis(5)),
    )
    .expect("store should build")
}

fn row(id: Value, namespace: &str, parsed_at: Option<&str>) -> Value {
    json!({
        "id": id,
        "name": "Physics 101",
        "user_id": "user-1",
        "file_name": "user-1/physics.pdf",
        "file_url": "https://cdn/physics.pdf",
        "page_count": 12,
        "file_size": 4096,
        "first_page_text": "Chapter 1",
        "pinecone_namespace": namespace,
        "parsed_at": parsed_at,
        "metadata": {"pages": 12},
        "created_at": "2025-03-01T10:00:00+00:00"
    })
}

#[tokio::test]
async fn get_bot_maps_hosted_columns() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bots"))
        .and(query_param("id", "eq.17"))
        .and(header("apikey", "service-key"))
        .and(header("Authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(
            json!(17),
            "bot-17",
            Some("2025-03-01T10:05:00+00:00")
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let bot = store(&server)
        .get_bot("17")
        .await
        .expect("request should succeed")
        .expect("bot should exist");

    assert_eq!(bot.id, "17");
    assert_eq!(bot.file_path, "user-1/physics.pdf");
    assert_eq!(bot.namespace.as_deref(), Some("bot-17"));
    assert!(bot.is_searchable());
    assert_eq!(bot.metadata.as_deref(), Some(r#"{"pages":12}"#));
}

#[tokio::test]
async fn missing_bot_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(
        store(&server)
            .get_bot("nope")
            .await
            .expect("request should succeed")
            .is_none()
    );
}

#[tokio::test]
async fn create_inserts_placeholder_then_assigns_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bots"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({
            "name": "Physics 101",
            "file_name": "user-1/physics.pdf",
            "pinecone_namespace": "temp-namespace"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([row(json!("abc"), "temp-namespace", None)])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bots"))
        .and(query_param("id", "eq.abc"))
        .and(body_partial_json(json!({"pinecone_namespace": "bot-abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(json!("abc"), "bot-abc", None)])))
        .expect(1)
        .mount(&server)
        .await;

    let bot = store(&server)
        .create_bot(NewBot {
            name: "Physics 101".to_string(),
            user_id: Some("user-1".to_string()),
            file_path: "user-1/physics.pdf".to_string(),
            ..NewBot::default()
        })
        .await
        .expect("create should succeed");

    assert_eq!(bot.namespace.as_deref(), Some("bot-abc"));
    assert!(!bot.is_searchable());
}

#[tokio::test]
async fn failed_insert_is_sent_once_even_with_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bots"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "upstream timeout"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = SupabaseBotStore::new(
        &server.uri(),
        "service-key",
        HttpClient::new(Duration::from_secs(5))
            .with_retry_attempts(3)
            .with_backoff(Duration::from_millis(5)),
    )
    .expect("store should build");

    let error = store
        .create_bot(NewBot {
            name: "Physics 101".to_string(),
            file_path: "user-1/physics.pdf".to_string(),
            ..NewBot::default()
        })
        .await
        .expect_err("create should fail");

    assert!(error.to_string().contains("HTTP 500"), "{error}");
}

#[tokio::test]
async fn mark_processed_patches_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bots"))
        .and(query_param("id", "eq.abc"))
        .and(body_partial_json(json!({"pinecone_namespace": "bot-abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(
            json!("abc"),
            "bot-abc",
            Some("2025-03-01T10:05:00+00:00")
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let found = store(&server)
        .mark_processed("abc", "bot-abc", Utc::now())
        .await
        .expect("patch should succeed");
    assert!(found);
}

#[tokio::test]
async fn list_orders_and_filters_by_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bots"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("user_id", "eq.user-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(json!(2), "bot-2", None),
            row(json!(1), "bot-1", None)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let bots = store(&server)
        .list_bots(Some("user-1"))
        .await
        .expect("list should succeed");
    let ids: Vec<&str> = bots.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
}

#[tokio::test]
async fn delete_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/bots"))
        .and(query_param("id", "eq.gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bots"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let store = store(&server);
    assert!(!store.delete_bot("gone").await.expect("delete should succeed"));

    let err = store.get_bot("x").await.expect_err("401 should fail");
    assert!(matches!(err, StemError::Database(_)));
    assert!(err.to_string().contains("Invalid API key"));
}

#[test]
fn from_config_requires_url_and_key() {
    let mut config = Config::default();
    assert!(SupabaseBotStore::from_config(&config, HttpClient::default()).is_err());

    config.supabase.url = Some("https://project.supabase.co".to_string());
    config.supabase.service_key = Some("key".to_string());
    assert!(SupabaseBotStore::from_config(&config, HttpClient::default()).is_ok());
}
