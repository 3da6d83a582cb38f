//! Integration tests for ArgoMux HTTP endpoints
//!
//! Tests the router end-to-end for the endpoints that do not need a live
//! upstream: health, version, model listing, input validation, and the
//! malformed-request fallback. Upstream-facing flows are covered by the
//! converter and tool tests.

use argomux::config::Config;
use argomux::server::ProxyMode;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

/// Test configuration with log directories pointed at a temp dir.
fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.config_path = Some(dir.path().join("config.toml"));
    config.argo.user = "test-user".to_string();
    config
}

fn test_app(dir: &tempfile::TempDir) -> axum::Router {
    argomux::create_app(test_config(dir), ProxyMode::Translate).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_create_app_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let result = argomux::create_app(test_config(&dir), ProxyMode::Translate);
    assert!(result.is_ok(), "create_app should succeed with valid config");
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_app(&dir)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_version_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_app(&dir)
        .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "argomux");
}

#[tokio::test]
async fn test_models_endpoint_lists_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_app(&dir)
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["object"], "list");
    let ids: Vec<&str> =
        json["data"].as_array().unwrap().iter().filter_map(|m| m["id"].as_str()).collect();
    assert!(ids.contains(&"argo:gpt-4o"));
    assert!(ids.contains(&"argo:claude-sonnet-4"));
    assert!(ids.contains(&"argo:text-embedding-3-small"));
}

#[tokio::test]
async fn test_chat_missing_model_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"messages": [{"role": "user", "content": "Hi"}]}"#))
        .unwrap();

    let response = test_app(&dir).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["object"], "error");
    assert_eq!(json["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_chat_missing_messages_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"model": "argo:gpt-4o"}"#))
        .unwrap();

    let response = test_app(&dir).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_embeddings_missing_input_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/embeddings")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"model": "argo:text-embedding-3-small"}"#))
        .unwrap();

    let response = test_app(&dir).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_logged_and_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from("{'this is not json"))
        .unwrap();

    let response = test_app(&dir).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The malformed body landed in the attack log directory.
    let attack_dir = dir.path().join("attack_logs");
    assert!(attack_dir.is_dir());
    assert_eq!(std::fs::read_dir(&attack_dir).unwrap().count(), 1);
}

#[tokio::test]
async fn test_unknown_route_hits_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let response = test_app(&dir)
        .oneshot(
            Request::builder()
                .uri("/index.php?page=../../../etc/passwd")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["type"], "not_found");
    assert!(dir.path().join("attack_logs").is_dir());
}

#[tokio::test]
async fn test_messages_missing_model_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"messages": [{"role": "user", "content": "Hi"}]}"#))
        .unwrap();

    let response = test_app(&dir).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
