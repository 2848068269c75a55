//! Client pagination over mock list endpoints.

use anyhow::Result;
use azure_devops_core::{ApiRequest, ErrorKind};
use futures::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{bearer_client, hits};

const REPOS: &str = "/contoso/_apis/git/repositories";

async fn mount_two_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(REPOS))
        .and(query_param("$top", "2"))
        .and(query_param_is_missing("continuationToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "value": [{"id": "r1"}, {"id": "r2"}],
            "continuationToken": "c2"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(REPOS))
        .and(query_param("continuationToken", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "value": [{"id": "r3"}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_all_pages_follows_body_cursor() -> Result<()> {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let client = bearer_client(&server, 0)?;
    let items = client
        .paginate(ApiRequest::get("git/repositories"), 2)
        .get_all_pages()
        .await?;

    let ids: Vec<_> = items.iter().map(|i| i["id"].as_str().unwrap_or_default()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
    assert_eq!(hits(&server, REPOS).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_iterate_pages_reports_page_metadata() -> Result<()> {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let client = bearer_client(&server, 0)?;
    let pages: Vec<_> = client
        .paginate(ApiRequest::get("git/repositories"), 2)
        .iterate_pages()
        .try_collect()
        .await?;

    assert_eq!(pages.len(), 2);
    assert!(pages[0].has_more);
    assert_eq!(pages[0].next_cursor.as_ref().map(|c| c.value()), Some("c2"));
    assert_eq!(pages[0].total_count, Some(2));
    assert!(!pages[1].has_more);
    Ok(())
}

#[tokio::test]
async fn test_header_cursor_is_followed() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contoso/_apis/wit/workitemtypes"))
        .and(query_param_is_missing("continuationToken"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-continuationtoken", "hdr-2")
                .set_body_json(json!({"value": [1, 2]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contoso/_apis/wit/workitemtypes"))
        .and(query_param("continuationToken", "hdr-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [3]})))
        .mount(&server)
        .await;

    let client = bearer_client(&server, 0)?;
    let items: Vec<_> = client
        .paginate(ApiRequest::get("wit/workitemtypes"), 2)
        .iterate_items()
        .try_collect()
        .await?;

    assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
    Ok(())
}

#[tokio::test]
async fn test_failed_page_is_wrapped() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REPOS))
        .and(query_param_is_missing("continuationToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [1],
            "continuationToken": "gone"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(REPOS))
        .and(query_param("continuationToken", "gone"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "cursor expired"})),
        )
        .mount(&server)
        .await;

    let client = bearer_client(&server, 0)?;
    let err = client
        .paginate(ApiRequest::get("git/repositories"), 1)
        .get_all_pages()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Pagination);
    let cause = std::error::Error::source(&err)
        .and_then(|s| s.downcast_ref::<azure_devops_core::Error>())
        .map(|e| e.kind());
    assert_eq!(cause, Some(ErrorKind::NotFound));
    Ok(())
}

#[tokio::test]
async fn test_max_pages_limits_requests() -> Result<()> {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let client = bearer_client(&server, 0)?;
    let items = client
        .paginate(ApiRequest::get("git/repositories"), 2)
        .max_pages(1)
        .get_all_pages()
        .await?;

    assert_eq!(items.len(), 2);
    assert_eq!(hits(&server, REPOS).await, 1);
    Ok(())
}
