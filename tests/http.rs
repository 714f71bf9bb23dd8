//! HTTP Integration Tests
//!
//! Drives the router in-process: tool calls over `/mcp`, downloads, CORS
//! and the shutdown path of the server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use json_to_excel::adapters::{router, serve_until, McpHandler, TOOL_NAME};
use json_to_excel::config::{ArtifactSettings, ResolvedConfig, ServerSettings};
use json_to_excel::core::{ArtifactRegistry, ExcelService, RegistryConfig, TracingObserver};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn app_in(temp: &TempDir) -> (Router, Arc<ArtifactRegistry>) {
    let registry = ArtifactRegistry::open(
        RegistryConfig {
            root: temp.path().join("downloads"),
            validity: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(30),
        },
        Arc::new(TracingObserver),
    )
    .await
    .unwrap();
    let service = Arc::new(ExcelService::new(
        Arc::clone(&registry),
        "http://localhost:8080",
    ));
    let app = router(
        McpHandler::new(service),
        registry.root(),
        &ServerSettings::default(),
    );
    (app, registry)
}

fn post_mcp(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn test_tool_call_returns_downloadable_link() {
    let temp = TempDir::new().unwrap();
    let (app, registry) = app_in(&temp).await;

    let response = app
        .clone()
        .oneshot(post_mcp(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {
                "name": TOOL_NAME,
                "arguments": {
                    "headers": { "name": "Name", "age": "Age" },
                    "data": [{ "name": "Ann", "age": 30 }, { "name": "Bo" }]
                }
            }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["id"], 7);

    let link = &body["result"]["content"][0];
    assert_eq!(link["type"], "resource_link");
    assert_eq!(
        link["mimeType"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let uri = link["uri"].as_str().unwrap();
    let id = uri
        .strip_prefix("http://localhost:8080/downloads/")
        .unwrap();
    assert!(registry.is_tracked(id).await);

    let download = app
        .oneshot(
            Request::builder()
                .uri(format!("/downloads/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(&body_bytes(download).await[..2], b"PK");
}

#[tokio::test]
async fn test_empty_headers_are_reported_as_text() {
    let temp = TempDir::new().unwrap();
    let (app, registry) = app_in(&temp).await;

    let response = app
        .oneshot(post_mcp(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": TOOL_NAME, "arguments": { "headers": {}, "data": [{ "a": 1 }] } }
        })))
        .await
        .unwrap();

    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["content"][0]["text"],
        "no header mapping was provided"
    );
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_notification_is_accepted_without_body() {
    let temp = TempDir::new().unwrap();
    let (app, _registry) = app_in(&temp).await;

    let response = app
        .oneshot(post_mcp(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_unknown_download_is_not_found() {
    let temp = TempDir::new().unwrap();
    let (app, _registry) = app_in(&temp).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/downloads/result-missing.xlsx")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let temp = TempDir::new().unwrap();
    let (app, _registry) = app_in(&temp).await;

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::ORIGIN, "http://example.com")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_server_shutdown_removes_download_dir() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("served");
    let config = ResolvedConfig {
        server: ServerSettings::default(),
        artifacts: ArtifactSettings {
            dir: dir.clone(),
            validity_seconds: 60,
            sweep_interval_seconds: 1,
        },
        config_file: None,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        serve_until(listener, &config, async move {
            let _ = stop_rx.await;
        })
        .await
    });

    // Wait for the registry to create its directory
    tokio::time::timeout(Duration::from_secs(5), async {
        while !dir.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!dir.exists());
}
