// ABOUTME: Admin and catalog routes: role management, scenario and preset creation
// ABOUTME: Role changes are admin-tier; catalog administration is staff-tier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Administration routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::UserResponse;
use crate::errors::AppError;
use crate::middleware::AuthTier;
use crate::models::{QuotaPreset, Scenario, UserRole};
use crate::quota::Quota;
use crate::server::ServerResources;

/// Request to change a user's role
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

/// Request to create a scenario
#[derive(Debug, Deserialize)]
pub struct CreateScenarioRequest {
    pub slug: String,
    pub title: String,
    pub system_prompt: String,
    /// `"provider:model"` or a bare model name (implies anthropic)
    pub model: String,
}

/// Request to create a quota preset
#[derive(Debug, Deserialize)]
pub struct CreatePresetRequest {
    pub name: String,
    pub quota: serde_json::Value,
}

/// Create the admin route group
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:user_id/role", put(update_role))
        .route("/api/admin/scenarios", post(create_scenario).get(list_scenarios))
        .route("/api/admin/quota-presets", post(create_preset))
        .with_state(resources)
}

/// List all users (admin)
async fn list_users(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Admin)
        .await?;

    let users: Vec<UserResponse> = resources
        .database
        .users()
        .list()
        .await?
        .iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(serde_json::json!({ "users": users })))
}

/// Change a user's role (admin)
async fn update_role(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Admin)
        .await?;

    resources
        .database
        .users()
        .update_role(user_id, request.role)
        .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Create a scenario (staff)
async fn create_scenario(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<CreateScenarioRequest>,
) -> Result<Response, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    if request.slug.trim().is_empty() {
        return Err(AppError::invalid_input("Scenario slug cannot be empty"));
    }

    let scenario = Scenario {
        id: Uuid::new_v4(),
        slug: request.slug.trim().to_owned(),
        title: request.title,
        system_prompt: request.system_prompt,
        model: request.model,
    };
    resources
        .database
        .catalog()
        .create_scenario(&scenario)
        .await?;

    Ok((StatusCode::CREATED, Json(scenario)).into_response())
}

/// List scenarios (staff)
async fn list_scenarios(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    let scenarios = resources.database.catalog().list_scenarios().await?;
    Ok(Json(serde_json::json!({ "scenarios": scenarios })))
}

/// Create a quota preset (staff)
///
/// The descriptor is validated here so malformed quotas are rejected at the
/// door rather than discovered when an invitation snapshots them.
async fn create_preset(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<CreatePresetRequest>,
) -> Result<Response, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    let quota = Quota::parse(&request.quota)?;

    let preset = QuotaPreset {
        id: Uuid::new_v4(),
        name: request.name,
        quota: quota.to_descriptor().to_string(),
    };
    resources
        .database
        .catalog()
        .create_quota_preset(&preset)
        .await?;

    Ok((StatusCode::CREATED, Json(preset)).into_response())
}
