//! Retry, timeout, header and cancellation behavior of the request executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use azure_devops_core::{ApiRequest, CancelHandle, Client, CredentialConfig, ErrorKind};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    ATTEMPT_TIMEOUT, ORGANIZATION, api_root, bearer_client, bearer_client_at, hits,
};

const PROJECTS: &str = "/contoso/_apis/projects";

#[tokio::test]
async fn test_success_appends_api_version_and_auth() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .and(query_param("api-version", "7.1"))
        .and(query_param("$top", "5"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = bearer_client(&server, 3)?;
    let response = client.execute(ApiRequest::get("projects").query("$top", 5)).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.json_value()?["count"], 0);
    Ok(())
}

#[tokio::test]
async fn test_always_timeout_makes_max_retries_plus_one_attempts() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(200).set_delay(ATTEMPT_TIMEOUT * 4))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 3)?;
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(hits(&server, PROJECTS).await, 4);
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-ms-request-id", "req-404")
                .set_body_json(json!({"message": "Project does not exist"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = bearer_client(&server, 3)?;
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.message(), "Project does not exist");
    assert_eq!(err.request_id(), Some("req-404"));
    Ok(())
}

#[tokio::test]
async fn test_server_error_exhausts_retries() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 3)?;
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.body(), Some(&json!({"text": "unavailable"})));
    assert_eq!(hits(&server, PROJECTS).await, 4);
    Ok(())
}

#[tokio::test]
async fn test_server_error_then_success() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [1]})))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 3)?;
    let response = client.execute(ApiRequest::get("projects")).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(hits(&server, PROJECTS).await, 3);
    Ok(())
}

#[tokio::test]
async fn test_retry_after_is_honored() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 3)?;
    let started = Instant::now();
    let response = client.execute(ApiRequest::get("projects")).await?;

    assert_eq!(response.status(), 200);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(hits(&server, PROJECTS).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_after_exhaustion() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 1)?;
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::ZERO));
    assert_eq!(hits(&server, PROJECTS).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_server_throttle_pauses_shared_limiter() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 0)?;
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(client.rate_limiter().stats().current_tokens, 0.0);

    let started = Instant::now();
    let response = client.execute(ApiRequest::get("projects")).await?;
    assert_eq!(response.status(), 200);
    assert!(started.elapsed() >= Duration::from_millis(800));
    Ok(())
}

#[tokio::test]
async fn test_dropped_connection_is_retried() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
        }
    });

    let client = bearer_client_at(&format!("http://{}/{}/_apis", addr, ORGANIZATION), 3)?;
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.status().is_none());
    assert_eq!(accepted.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_is_retried() -> Result<()> {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };

    let client = bearer_client_at(&format!("http://{}/{}/_apis", addr, ORGANIZATION), 3)?;
    let started = Instant::now();
    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connection);
    // Backoff of 10ms, 20ms and 40ms between the four attempts.
    assert!(started.elapsed() >= Duration::from_millis(70));
    Ok(())
}

#[tokio::test]
async fn test_caller_headers_win() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/_apis/wit/wiql"))
        .and(header("authorization", "Bearer caller-token"))
        .and(header("content-type", "application/json-patch+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"workItems": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = bearer_client(&server, 0)?;
    let request = ApiRequest::post("wit/wiql")
        .header("Authorization", "Bearer caller-token")
        .header("Content-Type", "application/json-patch+json")
        .json(json!({"query": "SELECT [System.Id] FROM WorkItems"}));
    client.execute(request).await?;
    Ok(())
}

#[tokio::test]
async fn test_client_request_id_is_stable_across_retries() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 2)?;
    let _ = client.execute(ApiRequest::get("projects")).await;

    let requests = server.received_requests().await.unwrap_or_default();
    let ids: Vec<_> = requests
        .iter()
        .filter_map(|r| r.headers.get("x-ms-client-request-id"))
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    Ok(())
}

#[tokio::test]
async fn test_api_version_override() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .and(query_param("api-version", "7.2-preview.4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = bearer_client(&server, 0)?;
    client
        .execute(ApiRequest::get("projects").api_version("7.2-preview.4"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_json_helpers() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/contoso/_apis/git/repositories/r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "r1", "name": "renamed"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/contoso/_apis/git/repositories/r1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 0)?;
    let updated: Value = client
        .patch_json("git/repositories/r1", &json!({"name": "renamed"}))
        .await?;
    assert_eq!(updated["name"], "renamed");

    let deleted = client.delete("git/repositories/r1").await?;
    assert_eq!(deleted.status(), 204);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_interrupts_in_flight_call() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PROJECTS))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    // Long enough that only cancellation can end the call early.
    let client = Client::builder()
        .credentials(CredentialConfig::static_bearer(ORGANIZATION, "t")?)
        .base_url(api_root(&server))
        .timeout(Duration::from_secs(30))
        .build()?;

    let handle = CancelHandle::new();
    let signal = handle.signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute_with_cancel(ApiRequest::get("projects"), &signal)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}
