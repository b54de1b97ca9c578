//! API integration tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`; no socket
//! is bound.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use fieldcalc::api::router;
use fieldcalc::api::server::{ApiConfig, AppState};
use fieldcalc::config::{EngineConfig, SandboxLimits};
use fieldcalc::FormulaEngine;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    router(Arc::new(AppState::new(FormulaEngine::new())))
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(path: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(app(), request).await
}

async fn post(path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app(), request).await
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_default() {
    let config = ApiConfig::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8080);
}

#[test]
fn test_config_custom_limits() {
    let config = ApiConfig {
        engine: EngineConfig {
            limits: SandboxLimits {
                timeout_ms: 1000,
                ..SandboxLimits::default()
            },
        },
        ..ApiConfig::default()
    };
    let state = AppState::new(FormulaEngine::with_config(config.engine));
    assert_eq!(state.engine.config().limits.timeout_ms, 1000);
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["request_id"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_version() {
    let (status, body) = get("/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let (_, body) = get("/").await;
    let paths: Vec<&str> = body["data"]["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert!(paths.contains(&"/api/v1/evaluate"));
    assert!(paths.contains(&"/api/v1/dependencies"));
}

// ═══════════════════════════════════════════════════════════════════════════
// EVALUATE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_evaluate_value() {
    let (status, body) = post(
        "/api/v1/evaluate",
        json!({"expression": "MATH.round({{Value}} / 3)", "fieldValues": {"Value": 10}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"value": 3.0, "error": null}));
}

#[tokio::test]
async fn test_evaluate_related() {
    let (_, body) = post(
        "/api/v1/evaluate",
        json!({
            "expression": "{{Revenue}}",
            "fieldValues": {},
            "relatedEntities": {"Organization": {"Revenue": 1000}}
        }),
    )
    .await;
    assert_eq!(body["data"]["value"], 1000.0);
}

#[tokio::test]
async fn test_evaluate_null_propagation() {
    let (_, body) = post(
        "/api/v1/evaluate",
        json!({"expression": "{{X}} + 1", "field_values": {"X": null}}),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({"value": null, "error": null}));
}

#[tokio::test]
async fn test_evaluate_error_is_data() {
    let (status, body) = post("/api/v1/evaluate", json!({"expression": "(1 + "})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["value"].is_null());
    assert!(body["data"]["error"]
        .as_str()
        .unwrap()
        .starts_with("Syntax error"));
}

#[tokio::test]
async fn test_evaluate_rejects_malformed_body() {
    let (status, _) = post("/api/v1/evaluate", json!({"formula": "1"})).await;
    assert!(status.is_client_error());
}

// ═══════════════════════════════════════════════════════════════════════════
// VALIDATE AND DEPENDENCIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_validate_valid() {
    let (_, body) = post(
        "/api/v1/validate",
        json!({"expression": "{{A}} + {{B}}", "existingFieldNames": ["A", "B"], "editingFieldName": "C"}),
    )
    .await;
    assert_eq!(body["data"], json!({"valid": true, "dependencies": ["A", "B"]}));
}

#[tokio::test]
async fn test_validate_unknown_field() {
    let (_, body) = post(
        "/api/v1/validate",
        json!({"expression": "{{Unknown}}", "existingFieldNames": ["Other"]}),
    )
    .await;
    assert_eq!(
        body["data"],
        json!({"valid": false, "error": "unknown field: Unknown"})
    );
}

#[tokio::test]
async fn test_dependencies() {
    let (_, body) = post(
        "/api/v1/dependencies",
        json!({"expression": "{{A}} + {{Org.B}} + {{A}}"}),
    )
    .await;
    assert_eq!(body["data"]["dependencies"], json!(["A", "Org.B", "A"]));
    assert_eq!(body["data"]["unique"], json!(["A", "Org.B"]));
}
