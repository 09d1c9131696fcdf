//! Server end-to-end tests
//!
//! Drives a real listener over HTTP, including graceful shutdown.

mod common;

use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use common::TestHarness;

#[tokio::test]
async fn test_health_over_http() {
    let (h, addr) = TestHarness::new().with_server().await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["instanceId"], h.ctx.instance_id.to_string());
}

#[tokio::test]
async fn test_process_over_http() {
    let (h, addr) = TestHarness::new().with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/process"))
        .json(&serde_json::json!({
            "sourceLocation": "https://example.test/clip.mp4",
            "outputIdentity": "renders/clip.mp4",
            "transform": {"style": "grayscale"}
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let header_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["publicURL"], "https://cdn.example.test/renders/clip.mp4");
    assert_eq!(json["requestId"], header_id);
    assert!(h.scratch_is_empty());
}

#[tokio::test]
async fn test_validation_failure_over_http() {
    let (_h, addr) = TestHarness::new().with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/process"))
        .json(&serde_json::json!({"outputIdentity": "a.mp4"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"]["kind"], "ValidationError");
}

#[tokio::test]
async fn test_shutdown_token_stops_server() {
    let h = TestHarness::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(mr_server::serve(listener, h.ctx.clone()));

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    h.ctx.shutdown.cancel();
    let result = timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not shut down")
        .unwrap();
    assert!(result.is_ok());
}
