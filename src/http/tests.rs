use super::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client() -> HttpClient {
    HttpClient::new(Duration::from_secs(5))
        .with_retry_attempts(3)
        .with_backoff(Duration::from_millis(5))
}

async fn get(client: HttpClient, url: String) -> Result<HttpResponse, HttpError> {
    tokio::task::spawn_blocking(move || client.execute("test get", |agent| agent.get(&url).call()))
        .await
        .expect("blocking task should not panic")
}

#[test]
fn join_url_normalises_slashes() {
    assert_eq!(
        join_url("https://example.com/", &["/storage/v1/", "object", "bots/"]),
        "https://example.com/storage/v1/object/bots"
    );
    assert_eq!(join_url("https://example.com", &[]), "https://example.com");
    assert_eq!(
        join_url("http://localhost:1234", &["", "a"]),
        "http://localhost:1234/a"
    );
}

#[test]
fn upstream_message_prefers_json_fields() {
    let error = HttpError::Status {
        status: 404,
        body: r#"{"code":5,"message":"Namespace not found"}"#.to_string(),
    };
    assert_eq!(error.upstream_message(), "HTTP 404: Namespace not found");
    assert_eq!(error.status(), Some(404));

    let error = HttpError::Status {
        status: 400,
        body: r#"{"error":"Object not found"}"#.to_string(),
    };
    assert_eq!(error.upstream_message(), "HTTP 400: Object not found");

    let error = HttpError::Status {
        status: 502,
        body: "bad gateway\n".to_string(),
    };
    assert_eq!(error.upstream_message(), "HTTP 502: bad gateway");

    let error = HttpError::Status {
        status: 500,
        body: String::new(),
    };
    assert_eq!(error.upstream_message(), "HTTP 500");

    assert_eq!(HttpError::Transport("boom".to_string()).status(), None);
}

#[tokio::test]
async fn successful_response_is_returned_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let response = get(fast_client(), format!("{}/ok", server.uri()))
        .await
        .expect("request should succeed");

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "hello");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"nope"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let error = get(fast_client(), format!("{}/missing", server.uri()))
        .await
        .expect_err("404 should fail");

    assert_eq!(error.status(), Some(404));
    assert_eq!(error.upstream_message(), "HTTP 404: nope");
}

#[tokio::test]
async fn server_errors_are_retried_until_attempts_run_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let error = get(fast_client(), format!("{}/flaky", server.uri()))
        .await
        .expect_err("503 should fail after retries");

    assert_eq!(error.status(), Some(503));
}

#[tokio::test]
async fn retry_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/eventually"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/eventually"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let response = get(fast_client(), format!("{}/eventually", server.uri()))
        .await
        .expect("second attempt should succeed");

    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn connection_failures_surface_as_transport_errors() {
    let client = fast_client().with_retry_attempts(1);

    // Port 9 (discard) is not listening on test machines
    let error = get(client, "http://127.0.0.1:9/".to_string())
        .await
        .expect_err("nothing listens on port 9");

    assert!(matches!(error, HttpError::Transport(_)));
}
