//! REST adapter against a mock PostgREST/storage server.

use chrono::NaiveDate;
use holdfast_core::remote::{BlobStore, HabitStore, ImageTransform, RemoteConfig, RestClient};
use holdfast_core::{RemoteError, TaskId};
use mockito::Matcher;
use serde_json::json;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
}

fn client(base_url: &str) -> RestClient {
    let cfg = RemoteConfig {
        base_url: base_url.into(),
        api_key: "anon-key".into(),
        transform_function: Some("punish".into()),
        ..RemoteConfig::default()
    };
    RestClient::new(&cfg).unwrap().with_today(today)
}

#[tokio::test]
async fn fetch_derives_completed_today() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/habits")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("completions.completed_on".into(), "eq.2026-10-14".into()),
            Matcher::UrlEncoded("order".into(), "created_at.asc".into()),
        ]))
        .match_header("apikey", "anon-key")
        .match_header("authorization", "Bearer anon-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": "t1", "title": "Drink water", "streak": 3,
                 "completions": [{"completed_on": "2026-10-14"}]},
                {"id": "t2", "title": "Read", "completions": []}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let tasks = client(&server.url()).fetch_tasks().await.unwrap();
    mock.assert_async().await;

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id.as_str(), "t1");
    assert!(tasks[0].completed_today);
    assert_eq!(tasks[0].streak, 3);
    assert!(!tasks[1].completed_today);
}

#[tokio::test]
async fn insert_posts_todays_completion() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rest/v1/completions")
        .match_header("prefer", "return=representation")
        .match_body(Matcher::Json(json!([
            {"task_id": "t1", "completed_on": "2026-10-14"}
        ])))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!([{"id": 42, "task_id": "t1", "completed_on": "2026-10-14"}]).to_string())
        .create_async()
        .await;

    let record = client(&server.url())
        .insert_completion(&TaskId::from("t1"))
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(record.id, "42");
    assert_eq!(record.completed_on, today());
}

#[tokio::test]
async fn delete_counts_removed_rows() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/rest/v1/completions")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("task_id".into(), "eq.t1".into()),
            Matcher::UrlEncoded("completed_on".into(), "eq.2026-10-14".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([{"id": 1}, {"id": 2}]).to_string())
        .create_async()
        .await;

    let removed = client(&server.url())
        .delete_today(&TaskId::from("t1"))
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/rest/v1/completions")
        .with_status(409)
        .with_body("duplicate key")
        .create_async()
        .await;

    let err = client(&server.url())
        .insert_completion(&TaskId::from("t1"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Status {
            status: 409,
            body: "duplicate key".into()
        }
    );
}

#[tokio::test]
async fn store_uploads_jpeg_and_returns_public_url() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock(
            "POST",
            Matcher::Regex(r"^/storage/v1/object/panic_images/panic_[0-9a-f-]+\.jpg$".into()),
        )
        .match_header("content-type", "image/jpeg")
        .with_status(200)
        .with_body(r#"{"Key":"panic_images/x.jpg"}"#)
        .create_async()
        .await;

    let receipt = client(&server.url())
        .store(&[0xFF, 0xD8, 0xFF], "panic_images")
        .await
        .unwrap();
    mock.assert_async().await;
    assert!(receipt.success);
    let url = receipt.url.unwrap();
    assert!(url.starts_with(&format!("{}/storage/v1/object/public/panic_images/panic_", server.url())));
}

#[tokio::test]
async fn transform_returns_generated_url() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/functions/v1/punish")
        .match_body(Matcher::Json(json!({
            "image_url": "https://cdn/p.jpg",
            "context": "Read"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"url": "https://ai/out.jpg"}).to_string())
        .create_async()
        .await;

    let url = client(&server.url())
        .transform("https://cdn/p.jpg", "Read")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(url, "https://ai/out.jpg");
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/rest/v1/habits")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"not": "a list"}"#)
        .create_async()
        .await;

    let err = client(&server.url()).fetch_tasks().await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let err = client("http://127.0.0.1:1").fetch_tasks().await.unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)));
}
