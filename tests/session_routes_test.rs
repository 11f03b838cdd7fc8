// ABOUTME: Integration tests for the invitation and session lifecycle routes
// ABOUTME: Claim flow, staff quick start atomicity, list_mine, tiers, observation notes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use axum::http::StatusCode;
use common::{bearer_for, create_test_resources, create_test_user, seed_preset, seed_scenario};
use helpers::axum_test::TestRequest;
use practica_server::models::{SessionStatus, UserRole};
use practica_server::routes;
use practica_server::routes::sessions::{InvitationResponse, SessionListResponse, SessionResponse};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_invitation_claim_creates_active_session() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let scenario = seed_scenario(&resources.database, "interview", "anthropic:claude-sonnet-4-20250514")
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 1000).await.unwrap();
    let router = routes::router(resources.clone());

    // Staff issues an invitation; the raw token appears exactly once
    let response = TestRequest::post("/api/invitations")
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({
            "scenario_id": scenario.id,
            "quota_preset_id": preset.id,
        }))
        .send(router.clone())
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let invitation: InvitationResponse = response.json();
    assert!(invitation.token.starts_with("inv_"));
    assert_eq!(invitation.quota.tokens, 1000);

    // An unauthenticated visitor claims it and gets an anonymous session
    let response = TestRequest::post("/api/invitations/claim")
        .json(&json!({ "token": invitation.token }))
        .send(router.clone())
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(
        response.set_cookie().is_some(),
        "claim without identity must mint an anonymous session cookie"
    );
    let session: SessionResponse = response.json();
    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.scenario_slug, "interview");

    // The session row exists and belongs to the minted user
    let stored = resources
        .database
        .sessions()
        .get_session(session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SessionStatus::Active);

    // A second claim of the same token conflicts
    let response = TestRequest::post("/api/invitations/claim")
        .json(&json!({ "token": invitation.token }))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_expired_invitation_cannot_be_claimed() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let scenario = seed_scenario(&resources.database, "expired-case", "claude-sonnet-4-20250514")
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 100).await.unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/invitations")
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({
            "scenario_id": scenario.id,
            "quota_preset_id": preset.id,
            "expires_in_days": 0,
        }))
        .send(router.clone())
        .await;
    let invitation: InvitationResponse = response.json();

    let response = TestRequest::post("/api/invitations/claim")
        .json(&json!({ "token": invitation.token }))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_new_missing_scenario_fails_before_any_write() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 500).await.unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/sessions/start")
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({
            "scenario_id": Uuid::new_v4(),
            "quota_preset_id": preset.id,
        }))
        .send(router)
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    // No orphaned invitation row survives the failed quick start
    assert_eq!(
        resources.database.sessions().count_invitations().await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_start_new_creates_self_claimed_session() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let scenario = seed_scenario(&resources.database, "quick", "claude-sonnet-4-20250514")
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 500).await.unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/sessions/start")
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({
            "scenario_id": scenario.id,
            "quota_preset_id": preset.id,
        }))
        .send(router)
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let session: SessionResponse = response.json();
    assert_eq!(session.status, SessionStatus::Active);

    // Exactly one invitation was written, already claimed by the caller
    assert_eq!(
        resources.database.sessions().count_invitations().await.unwrap(),
        1
    );
    let stored = resources
        .database
        .sessions()
        .get_session(session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, staff.id);
    let invitation = resources
        .database
        .sessions()
        .get_invitation(stored.invitation_id)
        .await
        .unwrap()
        .unwrap();
    assert!(invitation.is_claimed());
    assert_eq!(invitation.created_by, staff.id);
    assert_eq!(invitation.linked_user_id, Some(staff.id));
}

#[tokio::test]
async fn test_list_mine_unauthenticated_is_empty_not_an_error() {
    let resources = create_test_resources().await.unwrap();
    let router = routes::router(resources);

    let response = TestRequest::get("/api/sessions").send(router).await;

    assert_eq!(response.status, StatusCode::OK);
    let list: SessionListResponse = response.json();
    assert!(list.sessions.is_empty());
}

#[tokio::test]
async fn test_list_mine_returns_only_own_sessions() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let other = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let scenario = seed_scenario(&resources.database, "mine", "claude-sonnet-4-20250514")
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 500).await.unwrap();
    let router = routes::router(resources.clone());

    for auth in [bearer_for(&resources, &staff), bearer_for(&resources, &other)] {
        let response = TestRequest::post("/api/sessions/start")
            .header("authorization", &auth)
            .json(&json!({
                "scenario_id": scenario.id,
                "quota_preset_id": preset.id,
            }))
            .send(router.clone())
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let response = TestRequest::get("/api/sessions")
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;
    let list: SessionListResponse = response.json();
    assert_eq!(list.sessions.len(), 1);
    assert_eq!(list.sessions[0].scenario_slug, "mine");
    assert_eq!(list.sessions[0].status, SessionStatus::Active);
}

#[tokio::test]
async fn test_invitation_creation_requires_staff_tier() {
    let resources = create_test_resources().await.unwrap();
    let member = create_test_user(&resources.database, UserRole::Member)
        .await
        .unwrap();
    let router = routes::router(resources.clone());

    let body = json!({
        "scenario_id": Uuid::new_v4(),
        "quota_preset_id": Uuid::new_v4(),
    });

    // Member: authenticated but forbidden
    let response = TestRequest::post("/api/invitations")
        .header("authorization", &bearer_for(&resources, &member))
        .json(&body)
        .send(router.clone())
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // No identity at all: unauthorized
    let response = TestRequest::post("/api/invitations")
        .json(&body)
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_observation_notes_are_staff_only() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let member = create_test_user(&resources.database, UserRole::Member)
        .await
        .unwrap();
    let scenario = seed_scenario(&resources.database, "observed", "claude-sonnet-4-20250514")
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 500).await.unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/sessions/start")
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({
            "scenario_id": scenario.id,
            "quota_preset_id": preset.id,
        }))
        .send(router.clone())
        .await;
    let session: SessionResponse = response.json();

    let notes_uri = format!("/api/sessions/{}/notes", session.id);

    let response = TestRequest::post(&notes_uri)
        .header("authorization", &bearer_for(&resources, &member))
        .json(&json!({ "body": "not allowed" }))
        .send(router.clone())
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = TestRequest::post(&notes_uri)
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({ "body": "participant hesitated before answering" }))
        .send(router.clone())
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = TestRequest::get(&notes_uri)
        .header("authorization", &bearer_for(&resources, &staff))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["notes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_completing_a_session_records_status() {
    let resources = create_test_resources().await.unwrap();
    let staff = create_test_user(&resources.database, UserRole::Staff)
        .await
        .unwrap();
    let scenario = seed_scenario(&resources.database, "finish", "claude-sonnet-4-20250514")
        .await
        .unwrap();
    let preset = seed_preset(&resources.database, 500).await.unwrap();
    let router = routes::router(resources.clone());

    let response = TestRequest::post("/api/sessions/start")
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({
            "scenario_id": scenario.id,
            "quota_preset_id": preset.id,
        }))
        .send(router.clone())
        .await;
    let session: SessionResponse = response.json();

    let response = TestRequest::put(&format!("/api/sessions/{}/status", session.id))
        .header("authorization", &bearer_for(&resources, &staff))
        .json(&json!({ "status": "COMPLETED" }))
        .send(router)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let stored = resources
        .database
        .sessions()
        .get_session(session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
}
