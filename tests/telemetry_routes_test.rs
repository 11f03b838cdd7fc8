// ABOUTME: Integration tests for telemetry tracking and staff aggregate endpoints
// ABOUTME: Best-effort track, summary ratios, daily buckets, scenario ranking, pagination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use axum::http::StatusCode;
use common::{bearer_for, create_test_resources, create_test_user};
use helpers::axum_test::TestRequest;
use practica_server::models::UserRole;
use practica_server::routes;
use serde_json::json;

#[tokio::test]
async fn test_track_is_public_and_always_accepted() {
    let resources = create_test_resources().await.unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/telemetry/events")
        .json(&json!({
            "name": "page_view",
            "properties": { "path": "/welcome" },
        }))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    // The event landed
    let (events, total) = resources
        .database
        .telemetry()
        .list_paginated(1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(events[0].name, "page_view");
    assert_eq!(events[0].properties["path"], "/welcome");
}

#[tokio::test]
async fn test_track_attaches_identity_when_presented() {
    let resources = create_test_resources().await.unwrap();
    let user = create_test_user(&resources.database, UserRole::Member)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/telemetry/events")
        .header("authorization", &bearer_for(&resources, &user))
        .json(&json!({ "name": "page_view" }))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);

    let (events, _) = resources
        .database
        .telemetry()
        .list_paginated(1, 10)
        .await
        .unwrap();
    assert_eq!(events[0].user_id, Some(user.id));
}

#[tokio::test]
async fn test_summary_with_no_started_conversations_has_zero_completion_rate() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::get("/api/telemetry/summary")
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body: serde_json::Value = response.json();
    let summary = &body["summary"];
    assert_eq!(summary["conversations_started"], 0);
    assert_eq!(summary["completion_rate"], 0.0);
}

#[tokio::test]
async fn test_summary_counts_and_completion_rate() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    for (name, properties) in [
        ("conversation_started", json!({"scenarioSlug": "a"})),
        ("conversation_started", json!({"scenarioSlug": "b"})),
        ("conversation_completed", json!({"durationMs": 60000})),
        ("message_sent", json!({})),
        ("message_sent", json!({})),
        ("message_sent", json!({})),
    ] {
        let response = TestRequest::post("/api/telemetry/events")
            .json(&json!({ "name": name, "properties": properties }))
            .send(router.clone())
            .await;
        assert_eq!(response.status, StatusCode::ACCEPTED);
    }

    let response = TestRequest::get("/api/telemetry/summary")
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;
    let body: serde_json::Value = response.json();
    let summary = &body["summary"];

    assert_eq!(summary["total_events"], 6);
    assert_eq!(summary["conversations_started"], 2);
    assert_eq!(summary["conversations_completed"], 1);
    assert_eq!(summary["messages_sent"], 3);
    assert_eq!(summary["completion_rate"], 0.5);
    assert_eq!(summary["avg_duration_ms"], 60000.0);
}

#[tokio::test]
async fn test_time_series_buckets_by_utc_day_and_name() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    // Two different event names land on the same UTC day
    for name in ["conversation_started", "message_sent"] {
        TestRequest::post("/api/telemetry/events")
            .json(&json!({ "name": name }))
            .send(router.clone())
            .await;
    }

    let response = TestRequest::get("/api/telemetry/timeseries")
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body: serde_json::Value = response.json();
    let series = body["series"].as_object().unwrap();

    assert_eq!(series.len(), 1, "one date bucket for one day");
    let (_, bucket) = series.iter().next().unwrap();
    assert_eq!(bucket["conversation_started"], 1);
    assert_eq!(bucket["message_sent"], 1);
}

#[tokio::test]
async fn test_top_scenarios_ranking_with_unknown_bucket_and_limit() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    for properties in [
        json!({"scenarioSlug": "interview"}),
        json!({"scenarioSlug": "interview"}),
        json!({"scenarioSlug": "interview"}),
        json!({"scenarioSlug": "feedback"}),
        json!({"scenarioSlug": "feedback"}),
        json!({}),
    ] {
        TestRequest::post("/api/telemetry/events")
            .json(&json!({ "name": "conversation_started", "properties": properties }))
            .send(router.clone())
            .await;
    }

    let response = TestRequest::get("/api/telemetry/top-scenarios?limit=2")
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;
    let body: serde_json::Value = response.json();
    let scenarios = body["scenarios"].as_array().unwrap();

    assert_eq!(scenarios.len(), 2, "truncated to the caller's limit");
    assert_eq!(scenarios[0]["scenario_slug"], "interview");
    assert_eq!(scenarios[0]["count"], 3);
    assert_eq!(scenarios[1]["scenario_slug"], "feedback");
    assert_eq!(scenarios[1]["count"], 2);
}

#[tokio::test]
async fn test_aggregates_require_staff_tier() {
    let resources = create_test_resources().await.unwrap();
    let member = create_test_user(&resources.database, UserRole::Member)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    for uri in [
        "/api/telemetry/summary",
        "/api/telemetry/timeseries",
        "/api/telemetry/top-scenarios",
        "/api/telemetry/events",
    ] {
        let response = TestRequest::get(uri)
            .header("authorization", &bearer_for(&resources, &member))
            .send(router.clone())
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{uri}");

        let response = TestRequest::get(uri).send(router.clone()).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_event_list_is_paginated_newest_first() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    for i in 0..5 {
        TestRequest::post("/api/telemetry/events")
            .json(&json!({ "name": format!("event_{i}") }))
            .send(router.clone())
            .await;
    }

    let response = TestRequest::get("/api/telemetry/events?page=1&per_page=2")
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;
    let body: serde_json::Value = response.json();

    assert_eq!(body["total"], 5);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["name"], "event_4", "newest first");
}
