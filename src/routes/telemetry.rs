// ABOUTME: Telemetry routes: fire-and-forget tracking plus staff aggregate dashboards
// ABOUTME: track swallows and logs failures so telemetry never fails the calling request
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Telemetry routes.
//!
//! `POST /api/telemetry/events` is deliberately best-effort: a failed insert
//! is logged and the caller still gets 202. The aggregate endpoints are
//! staff-tier and read-only.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::AuthTier;
use crate::server::ServerResources;
use crate::telemetry::TelemetryAggregator;

/// Default aggregate window when the caller gives no range
const DEFAULT_RANGE_DAYS: i64 = 30;

/// Ranking rows returned when the caller gives no limit
const DEFAULT_TOP_LIMIT: usize = 10;

// ============================================================================
// Request Types
// ============================================================================

/// Body for `track`
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// Date-range query shared by the aggregate endpoints
#[derive(Debug, Deserialize, Default)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RangeQuery {
    fn resolve(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = self.to.unwrap_or_else(Utc::now);
        let from = self.from.unwrap_or(to - Duration::days(DEFAULT_RANGE_DAYS));
        (from, to)
    }
}

/// Query for the top-scenarios ranking
#[derive(Debug, Deserialize, Default)]
pub struct TopScenariosQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Query for the paginated event list
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

const fn default_page() -> i64 {
    1
}

const fn default_per_page() -> i64 {
    50
}

// ============================================================================
// Routes
// ============================================================================

/// Create the telemetry route group
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/telemetry/events", post(track).get(list_events))
        .route("/api/telemetry/summary", get(summary))
        .route("/api/telemetry/timeseries", get(time_series))
        .route("/api/telemetry/top-scenarios", get(top_scenarios))
        .with_state(resources)
}

/// Record an event without ever failing the caller
///
/// Insert failures are logged and swallowed — this is the one write path in
/// the API where errors are not propagated.
pub async fn track_event(
    resources: &ServerResources,
    name: &str,
    properties: serde_json::Value,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
) {
    if let Err(e) = resources
        .database
        .telemetry()
        .insert(name, &properties, user_id, session_id)
        .await
    {
        warn!("Telemetry write failed for '{name}': {e}");
    }
}

/// Fire-and-forget event recording (public)
async fn track(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<TrackRequest>,
) -> Result<StatusCode, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Public)
        .await?;

    track_event(
        &resources,
        &request.name,
        request.properties,
        context.user_id(),
        request.session_id,
    )
    .await;

    Ok(StatusCode::ACCEPTED)
}

/// Aggregate summary over a range (staff)
async fn summary(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    let (from, to) = query.resolve();
    let aggregator = TelemetryAggregator::new(resources.database.telemetry());
    let summary = aggregator.summary(from, to).await?;
    Ok(Json(serde_json::json!({ "summary": summary })))
}

/// Daily time-series buckets over a range (staff)
async fn time_series(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    let (from, to) = query.resolve();
    let aggregator = TelemetryAggregator::new(resources.database.telemetry());
    let series = aggregator.time_series(from, to).await?;
    Ok(Json(serde_json::json!({ "series": series })))
}

/// Scenario ranking by conversation starts (staff)
async fn top_scenarios(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(query): Query<TopScenariosQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    let (from, to) = RangeQuery {
        from: query.from,
        to: query.to,
    }
    .resolve();
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    let aggregator = TelemetryAggregator::new(resources.database.telemetry());
    let ranking = aggregator.top_scenarios(from, to, limit).await?;
    Ok(Json(serde_json::json!({ "scenarios": ranking })))
}

/// Newest-first raw event page (staff)
async fn list_events(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    let per_page = query.per_page.clamp(1, 200);
    let (events, total) = resources
        .database
        .telemetry()
        .list_paginated(query.page.max(1), per_page)
        .await?;

    Ok(Json(serde_json::json!({
        "events": events,
        "total": total,
        "page": query.page.max(1),
        "per_page": per_page,
    })))
}
