//! Integration tests for the fetch module.
//!
//! These tests drive the real HTTP transport and the retry wrapper against
//! mock servers.

use std::time::{Duration, Instant};

use bulkfetch_core::fetch::{
    Auth, FailureType, FetchError, GetApiCall, HttpClient, RetryPolicy, RetryableFetch,
    classify_error,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "support/socket_guard.rs"]
mod socket_guard;

use socket_guard::{refused_base_url_or_skip, start_mock_server_or_skip};

fn retryable(client: &HttpClient, url: String, policy: RetryPolicy) -> RetryableFetch {
    RetryableFetch::new(Box::new(GetApiCall::new(client.clone(), url)), policy)
}

async fn mount_json(server: &MockServer, route: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_json_returns_parsed_payload() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_json(&server, "/posts/1", 200, json!({ "id": 1, "title": "test 1" })).await;

    let client = HttpClient::new();
    let payload = client
        .get_json(&format!("{}/posts/1", server.uri()))
        .await
        .unwrap();

    assert_eq!(payload, json!({ "id": 1, "title": "test 1" }));
}

#[tokio::test]
async fn test_relative_item_resolved_against_base_url() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_json(&server, "/v1/posts/2", 200, json!({ "id": 2 })).await;

    let client = HttpClient::new()
        .with_base_url(&format!("{}/v1", server.uri()))
        .unwrap();
    let payload = client.get_json("posts/2").await.unwrap();

    assert_eq!(payload["id"], 2);
}

#[tokio::test]
async fn test_client_error_retried_until_exhausted() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/posts/bad"))
        .respond_with(ResponseTemplate::new(400))
        .expect(3)
        .mount(&server)
        .await;

    let client = HttpClient::new();
    let exhausted = retryable(
        &client,
        format!("{}/posts/bad", server.uri()),
        RetryPolicy::with_max_attempts(3),
    )
    .content()
    .await
    .unwrap_err();

    assert_eq!(exhausted.attempts, 3);
    assert_eq!(exhausted.failure_type, FailureType::Permanent);
    assert_eq!(exhausted.error.status(), Some(400));
}

#[tokio::test]
async fn test_server_error_then_success_is_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/posts/3"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_json(&server, "/posts/3", 200, json!({ "id": 3 })).await;

    let client = HttpClient::new();
    let fetched = retryable(
        &client,
        format!("{}/posts/3", server.uri()),
        RetryPolicy::default(),
    )
    .content()
    .await
    .unwrap();

    assert_eq!(fetched.attempts, 2);
    assert_eq!(fetched.payload, json!({ "id": 3 }));
}

#[tokio::test]
async fn test_connection_refused_is_transient_and_retried() {
    let Some(base) = refused_base_url_or_skip() else {
        return;
    };

    let client = HttpClient::new();
    let url = format!("{base}/posts/1");
    let error = client.get_json(&url).await.unwrap_err();
    assert!(matches!(error, FetchError::Network { .. }), "got {error:?}");
    assert_eq!(classify_error(&error), FailureType::Transient);

    let exhausted = retryable(&client, url, RetryPolicy::with_max_attempts(3))
        .content()
        .await
        .unwrap_err();

    assert_eq!(exhausted.attempts, 3);
    assert_eq!(exhausted.failure_type, FailureType::Transient);
    assert!(matches!(exhausted.error, FetchError::Network { .. }));
}

#[tokio::test]
async fn test_connection_refused_ignores_fail_fast() {
    let Some(base) = refused_base_url_or_skip() else {
        return;
    };

    let exhausted = retryable(
        &HttpClient::new(),
        format!("{base}/posts/1"),
        RetryPolicy::with_max_attempts(2).fail_fast_on_permanent(),
    )
    .content()
    .await
    .unwrap_err();

    assert_eq!(exhausted.attempts, 2);
}

#[tokio::test]
async fn test_rate_limited_response_honours_retry_after() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/posts/4"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_json(&server, "/posts/4", 200, json!({ "id": 4 })).await;

    let client = HttpClient::new();
    let started = Instant::now();
    let fetched = retryable(
        &client,
        format!("{}/posts/4", server.uri()),
        RetryPolicy::default(),
    )
    .content()
    .await
    .unwrap();

    assert_eq!(fetched.attempts, 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_non_json_body_is_a_decode_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/posts/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let client = HttpClient::new();
    let err = client
        .get_json(&format!("{}/posts/html", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Decode { .. }));
}

#[tokio::test]
async fn test_header_auth_is_sent() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("X-Api-Key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let client = HttpClient::new()
        .with_base_url(&server.uri())
        .unwrap()
        .with_auth(Auth::Header {
            name: "X-Api-Key".to_string(),
            token: "s3cret".to_string(),
        })
        .unwrap();

    assert_eq!(client.get_json("secure").await.unwrap(), json!({ "ok": true }));
}

#[tokio::test]
async fn test_query_auth_is_sent() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(query_param("api_key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let client = HttpClient::new()
        .with_base_url(&server.uri())
        .unwrap()
        .with_auth(Auth::QueryParam {
            name: "api_key".to_string(),
            token: "s3cret".to_string(),
        })
        .unwrap();

    assert_eq!(client.get_json("secure").await.unwrap(), json!({ "ok": true }));
}

#[tokio::test]
async fn test_missing_auth_is_rejected_by_server() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("X-Api-Key", "s3cret"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secure"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = HttpClient::new().with_base_url(&server.uri()).unwrap();
    let err = client.get_json("secure").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}
