// ABOUTME: Route composition for the Practica API
// ABOUTME: Groups handlers by concern and assigns every endpoint an authorization tier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # HTTP Routes
//!
//! Route groups, each with its handlers and typed request/response structs:
//!
//! - `auth` — Google sign-in completion, anonymous accounts, me/logout
//! - `sessions` — invitations, claims, quick start, listing, notes
//! - `stream` — the SSE message-streaming endpoint
//! - `telemetry` — fire-and-forget tracking plus staff aggregates
//! - `admin` — role management and catalog administration
//!
//! Every handler runs the authorization pipeline at exactly one tier before
//! touching anything else.

pub mod admin;
pub mod auth;
pub mod sessions;
pub mod stream;
pub mod telemetry;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};

use crate::server::ServerResources;

/// Compose all route groups
#[must_use]
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .merge(auth::routes(resources.clone()))
        .merge(sessions::routes(resources.clone()))
        .merge(stream::routes(resources.clone()))
        .merge(telemetry::routes(resources.clone()))
        .merge(admin::routes(resources))
}

/// Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
