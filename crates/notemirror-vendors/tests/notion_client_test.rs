//! Notion client and adapter tests against a mock Notion server.

use std::sync::Arc;

use chrono::Utc;
use notemirror_vendors::notion::{
    NotionApi, NotionClient, NotionConfig, NotionDatabaseAdapter, NotionSchema,
};
use notemirror_vendors::{Bucket, BucketAdapter, BucketType, Error, NoteStatus};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> NotionClient {
    let config = NotionConfig::default()
        .with_base_url(server.uri())
        .with_api_key("secret_abc");
    NotionClient::new(config).expect("Failed to create client")
}

fn page(id: &str, title: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "page",
        "id": id,
        "archived": false,
        "properties": {
            "Name": {"id": "title", "type": "title", "title": [
                {"type": "text", "text": {"content": title}, "plain_text": title}
            ]},
            "Tags": {"id": "t", "type": "multi_select", "multi_select": [{"name": "errand"}]},
            "Status": {"id": "s", "type": "select", "select": {"name": status}},
            "Mirror": {"id": "m", "type": "rich_text", "rich_text": []},
            "Vendor Entities": {"id": "v", "type": "rich_text", "rich_text": []}
        }
    })
}

fn error_body(status: u16, code: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "error",
        "status": status,
        "code": code,
        "message": format!("{} happened", code)
    })
}

#[tokio::test]
async fn test_requests_carry_auth_and_version_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pages/p1"))
        .and(header("Authorization", "Bearer secret_abc"))
        .and(header("Notion-Version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("p1", "Buy milk", "done")))
        .expect(1)
        .mount(&server)
        .await;

    let found = client(&server).retrieve_page("p1").await.unwrap();
    assert_eq!(found.unwrap().id, "p1");
}

#[tokio::test]
async fn test_missing_page_reads_as_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pages/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "object_not_found")))
        .mount(&server)
        .await;

    assert!(client(&server).retrieve_page("gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_archiving_missing_page_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/pages/gone"))
        .and(body_partial_json(serde_json::json!({"archived": true})))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "object_not_found")))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).archive_page("gone").await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "3")
                .set_body_json(error_body(429, "rate_limited")),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .query_database("db-1", None, None)
        .await
        .unwrap_err();
    match err {
        Error::VendorTransient {
            retry_after_secs, ..
        } => assert_eq!(retry_after_secs, Some(3)),
        other => panic!("expected transient error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_error_is_invalid_resource() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/pages/p1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(400, "validation_error")))
        .mount(&server)
        .await;

    let err = client(&server)
        .update_page("p1", &serde_json::Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidResource(_)));
}

#[tokio::test]
async fn test_adapter_scan_follows_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_partial_json(serde_json::json!({"start_cursor": "c2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "results": [page("p2", "Call mom", "in_progress")],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "results": [page("p1", "Buy milk", "not_started")],
            "has_more": true,
            "next_cursor": "c2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = NotionDatabaseAdapter::new(Arc::new(client(&server)), NotionSchema::default());
    let bucket = Bucket {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        query_id: "db-1".to_string(),
        bucket_type: BucketType::NotionDatabase,
        metadata: serde_json::json!({}),
        integration_id: None,
        created_at_utc: Utc::now(),
    };

    let notes = adapter.read_all(&bucket).await.unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].content, "Buy milk");
    assert_eq!(notes[1].status, NoteStatus::InProgress);
    assert!(notes[1].tags.contains("errand"));
}
