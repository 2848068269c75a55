//! Token acquisition, caching and invalidation against mock token endpoints.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use azure_devops_core::auth::DEFAULT_RESOURCE;
use azure_devops_core::{ApiRequest, CredentialConfig, CredentialProvider, ErrorKind};
use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{ORGANIZATION, hits, oauth_config, provider_client, token_body};

const TOKEN_PATH: &str = "/tenant/oauth2/v2.0/token";

#[tokio::test]
async fn test_client_credentials_grant() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app-id"))
        .and(body_string_contains("scope=https%3A%2F%2Fapp.vssps.visualstudio.com%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("oauth-token", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = CredentialProvider::new(oauth_config(&server)?)?;
    let headers = provider.auth_headers().await?;

    assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer oauth-token"));
    assert!(provider.cached_token().await.is_some());
    Ok(())
}

#[tokio::test]
async fn test_token_reused_inside_window_and_refreshed_after() -> Result<()> {
    let server = MockServer::start().await;
    // 301 s minus the 300 s safety buffer leaves a one-second window.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short-lived", 301)))
        .mount(&server)
        .await;

    let provider = CredentialProvider::new(oauth_config(&server)?)?;
    provider.auth_headers().await?;
    provider.auth_headers().await?;
    assert_eq!(provider.acquisition_count(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    provider.auth_headers().await?;
    assert_eq!(provider.acquisition_count(), 2);
    assert_eq!(hits(&server, TOKEN_PATH).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_callers_share_one_acquisition() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("shared", 3600))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let provider = Arc::new(CredentialProvider::new(oauth_config(&server)?)?);
    let results = join_all((0..8).map(|_| {
        let provider = Arc::clone(&provider);
        async move { provider.auth_headers().await }
    }))
    .await;

    for headers in results {
        assert_eq!(headers?.get("Authorization").map(String::as_str), Some("Bearer shared"));
    }
    assert_eq!(provider.acquisition_count(), 1);
    assert_eq!(hits(&server, TOKEN_PATH).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_authentication_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let provider = CredentialProvider::new(oauth_config(&server)?)?;
    let err = provider.auth_headers().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(err.message().contains("AADSTS7000215"));
    assert!(provider.cached_token().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_managed_identity_request_shape() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/identity/oauth2/token"))
        .and(header("metadata", "true"))
        .and(query_param("api-version", "2018-02-01"))
        .and(query_param("resource", DEFAULT_RESOURCE))
        .and(query_param("client_id", "mi-client"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mi-token",
                "expires_in": "3599",
                "token_type": "Bearer"
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = CredentialConfig::managed_identity(ORGANIZATION, "mi-client", "unused", "tenant")?
        .with_metadata_endpoint(format!("{}/metadata/identity/oauth2/token", server.uri()));
    let provider = CredentialProvider::new(config)?;
    let headers = provider.auth_headers().await?;

    assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer mi-token"));
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_response_drops_cached_token() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 3600)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contoso/_apis/projects"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contoso/_apis/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    let provider = Arc::new(CredentialProvider::new(oauth_config(&server)?)?);
    let client = provider_client(&server, Arc::clone(&provider))?;

    let err = client.execute(ApiRequest::get("projects")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(hits(&server, "/contoso/_apis/projects").await, 1);
    assert!(provider.cached_token().await.is_none());

    client.execute(ApiRequest::get("projects")).await?;
    assert_eq!(provider.acquisition_count(), 2);
    Ok(())
}
