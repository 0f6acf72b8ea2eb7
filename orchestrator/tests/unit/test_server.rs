//! HTTP surface tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use swarmdeck::server::serve::router;
use swarmdeck::server::state::ServerState;

use crate::support::{docker_host, fresh_host, scripted, ScriptedExecutor, HOST};

fn app(executor: ScriptedExecutor) -> Router {
    let (orchestrator, _, _) = scripted(executor);
    router(Arc::new(ServerState::new(Arc::new(orchestrator))))
}

fn credentials_with(extra: Value) -> Value {
    let mut body = json!({"host": HOST, "username": "root", "password": "hunter2"});
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    body
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(fresh_host()), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "swarmdeck");
}

#[tokio::test]
async fn test_units_table() {
    let (status, body) = send(app(fresh_host()), "GET", "/units", None).await;
    assert_eq!(status, StatusCode::OK);
    let units = body.as_array().unwrap();
    assert_eq!(units.len(), 13);
    let n8n = units.iter().find(|u| u["service_key"] == "n8n").unwrap();
    assert_eq!(n8n["requires"], json!(["redis", "postgres"]));
    assert_eq!(n8n["stacks"], json!(["n8n_editor", "n8n_webhook", "n8n_worker"]));
}

#[tokio::test]
async fn test_unknown_job_key_is_absent() {
    let (status, body) = send(app(fresh_host()), "GET", "/install-status/minio", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "absent");
    assert_eq!(body["service_key"], "minio");
}

#[tokio::test]
async fn test_blocked_install_is_precondition_failed() {
    let (status, body) = send(
        app(fresh_host()),
        "POST",
        "/install-swarm",
        Some(credentials_with(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(body["detail"].as_str().unwrap().contains("Docker"));
}

#[tokio::test]
async fn test_missing_parameter_is_bad_request() {
    let (status, body) = send(
        app(fresh_host()),
        "POST",
        "/install-traefik",
        Some(credentials_with(json!({"parameters": {}}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn test_accepted_install_returns_job_id() {
    let executor = docker_host().ok("docker swarm init", "Swarm initialized");
    let (status, body) = send(
        app(executor),
        "POST",
        "/install-swarm",
        Some(credentials_with(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
    assert!(body["job_id"].is_string());
}

#[tokio::test]
async fn test_already_installed_is_not_accepted() {
    let (status, body) = send(
        app(docker_host()),
        "POST",
        "/install-docker",
        Some(credentials_with(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], false);
    assert!(body.get("job_id").is_none());
}

#[tokio::test]
async fn test_missing_auth_material_is_bad_request() {
    let (status, _) = send(
        app(fresh_host()),
        "POST",
        "/system-status",
        Some(json!({"host": HOST, "username": "root"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_unit_route() {
    let (status, _) = send(
        app(fresh_host()),
        "POST",
        "/install-wordpress",
        Some(credentials_with(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_stack_env_is_not_found() {
    let (status, body) = send(
        app(fresh_host()),
        "POST",
        "/get-stack-env/wordpress",
        Some(credentials_with(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("wordpress"));
}

#[tokio::test]
async fn test_dns_requires_zone() {
    let (status, body) = send(
        app(fresh_host()),
        "POST",
        "/dns/records",
        Some(json!({"api_token": "token", "zone_id": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("zone_id"));
}

#[tokio::test]
async fn test_host_task_route_requires_docker() {
    let (status, _) = send(
        app(fresh_host()),
        "POST",
        "/upgrade-docker",
        Some(credentials_with(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_malformed_body_has_detail() {
    let request = Request::builder()
        .method("POST")
        .uri("/install-traefik")
        .header("content-type", "application/json")
        .body(Body::from("{\"host\": "))
        .unwrap();
    let response = app(fresh_host()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_wrongly_typed_field_has_detail() {
    let (status, body) = send(
        app(fresh_host()),
        "POST",
        "/verify-connection",
        Some(json!({"host": HOST, "username": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("username"));
}
