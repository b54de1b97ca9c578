//! API request handlers
//!
//! Handlers for all REST API endpoints.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::server::AppState;
use crate::core::{extract_dependencies, validate as validate_formula};
use crate::core::dependencies::unique;
use crate::types::{EvaluationResult, FieldValues, RelatedEntities, ValidationResult};

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }
}

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

impl EndpointInfo {
    fn new(method: &str, path: &str, description: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            description: description.to_string(),
        }
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Fieldcalc API Server".to_string(),
        version: state.version.clone(),
        description: "Formula evaluation for computed custom fields".to_string(),
        endpoints: vec![
            EndpointInfo::new("GET", "/health", "Health check endpoint"),
            EndpointInfo::new("GET", "/version", "Get server version"),
            EndpointInfo::new("POST", "/api/v1/evaluate", "Evaluate a formula"),
            EndpointInfo::new("POST", "/api/v1/validate", "Validate a formula before saving"),
            EndpointInfo::new(
                "POST",
                "/api/v1/dependencies",
                "List the fields a formula references",
            ),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "evaluate".to_string(),
            "validate".to_string(),
            "dependencies".to_string(),
        ],
    }))
}

/// Evaluate request
#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub expression: String,
    #[serde(default, alias = "fieldValues")]
    pub field_values: FieldValues,
    #[serde(default, alias = "relatedEntities")]
    pub related_entities: Option<RelatedEntities>,
}

/// POST /api/v1/evaluate - Evaluate a formula.
///
/// Formula errors are data, not request failures: they come back in
/// `data.error` with `success: true`.
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Json<ApiResponse<EvaluationResult>> {
    let result = state
        .engine
        .evaluate(
            &req.expression,
            &req.field_values,
            req.related_entities.as_ref(),
        )
        .await;
    Json(ApiResponse::ok(result))
}

/// Validate request
#[derive(Deserialize)]
pub struct ValidateRequest {
    pub expression: String,
    #[serde(default, alias = "existingFieldNames")]
    pub existing_field_names: Vec<String>,
    #[serde(default, alias = "editingFieldName")]
    pub editing_field_name: Option<String>,
}

/// POST /api/v1/validate - Validate a formula
pub async fn validate(Json(req): Json<ValidateRequest>) -> Json<ApiResponse<ValidationResult>> {
    let result = validate_formula(
        &req.expression,
        &req.existing_field_names,
        req.editing_field_name.as_deref(),
    );
    Json(ApiResponse::ok(result))
}

/// Dependencies request
#[derive(Deserialize)]
pub struct DependenciesRequest {
    pub expression: String,
}

/// Dependencies response
#[derive(Serialize)]
pub struct DependenciesResponse {
    /// Source order, duplicates included
    pub dependencies: Vec<String>,
    pub unique: Vec<String>,
}

/// POST /api/v1/dependencies - Extract referenced fields
pub async fn dependencies(
    Json(req): Json<DependenciesRequest>,
) -> Json<ApiResponse<DependenciesResponse>> {
    let dependencies = extract_dependencies(&req.expression);
    let unique = unique(&dependencies);
    Json(ApiResponse::ok(DependenciesResponse {
        dependencies,
        unique,
    }))
}
